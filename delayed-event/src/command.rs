//! Operation dispatch.
//!
//! The typed surface is [`Command`]. [`Command::parse`] keeps the loose
//! calling convention where the first positional argument names an operation
//! and anything else is read as the arguments of `bind`:
//!
//! ```rust,ignore
//! engine.invoke(&els, vec![Arg::from("stop")])?;
//! engine.invoke(&els, vec![Arg::from("click"), Arg::Millis(500), Arg::callback(cb)])?;
//! ```

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use compact_str::CompactString;

use crate::{
    binding::BatchCallback,
    element::ElementId,
    error::{EngineError, EngineResult},
    event::EventRecord,
};

/// Closed set of engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Bind,
    Stop,
}

impl Operation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bind" => Some(Self::Bind),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Stop => "stop",
        }
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| EngineError::UnknownOperation(s.into()))
    }
}

/// Arguments of a bind call.
#[derive(Clone)]
pub struct BindArgs {
    pub event_type: CompactString,
    /// `None` falls back to the configured default delay.
    pub delay: Option<Duration>,
    pub callback: BatchCallback,
}

impl BindArgs {
    pub fn new<F>(event_type: impl Into<CompactString>, delay: Duration, callback: F) -> Self
    where
        F: Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    {
        Self {
            event_type: event_type.into(),
            delay: Some(delay),
            callback: Arc::new(callback),
        }
    }

    /// Bind args using the engine's default delay.
    pub fn with_default_delay<F>(event_type: impl Into<CompactString>, callback: F) -> Self
    where
        F: Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    {
        Self {
            event_type: event_type.into(),
            delay: None,
            callback: Arc::new(callback),
        }
    }

    /// Signed millisecond delay, as hosts that pass raw numbers supply it.
    pub fn from_millis<F>(
        event_type: impl Into<CompactString>,
        delay_ms: i64,
        callback: F,
    ) -> EngineResult<Self>
    where
        F: Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    {
        Ok(Self::new(event_type, millis_to_delay(delay_ms)?, callback))
    }
}

impl fmt::Debug for BindArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindArgs")
            .field("event_type", &self.event_type)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Tagged operation request.
#[derive(Debug, Clone)]
pub enum Command {
    Bind(BindArgs),
    Stop,
}

impl Command {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Bind(_) => Operation::Bind,
            Self::Stop => Operation::Stop,
        }
    }

    /// Resolve a positional argument list.
    ///
    /// A leading operation name selects that operation. Otherwise the whole
    /// list is read as `bind` arguments, unless `strict` is set, in which case
    /// the unrecognised name is an [`EngineError::UnknownOperation`].
    pub fn parse(args: Vec<Arg>, strict: bool) -> EngineResult<Self> {
        let mut args = args.into_iter().peekable();

        let named = match args.peek() {
            Some(Arg::Str(name)) => Operation::from_name(name),
            _ => None,
        };

        match named {
            Some(Operation::Stop) => Ok(Self::Stop),
            Some(Operation::Bind) => {
                args.next();
                parse_bind(args).map(Self::Bind)
            }
            None => {
                if strict {
                    let name = match args.peek() {
                        Some(Arg::Str(name)) => name.clone(),
                        Some(other) => CompactString::from(other.kind()),
                        None => CompactString::const_new("<none>"),
                    };
                    return Err(EngineError::UnknownOperation(name));
                }
                parse_bind(args).map(Self::Bind)
            }
        }
    }
}

/// One loosely typed positional argument.
#[derive(Clone)]
pub enum Arg {
    Str(CompactString),
    Millis(i64),
    Callback(BatchCallback),
}

impl Arg {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Millis(_) => "number",
            Self::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Millis(ms) => f.debug_tuple("Millis").field(ms).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<i64> for Arg {
    fn from(ms: i64) -> Self {
        Self::Millis(ms)
    }
}

fn millis_to_delay(delay_ms: i64) -> EngineResult<Duration> {
    u64::try_from(delay_ms)
        .map(Duration::from_millis)
        .map_err(|_| {
            EngineError::invalid_argument("delay", format!("must not be negative, got {delay_ms}ms"))
        })
}

// (event_type, [delay_ms], callback)
fn parse_bind(args: impl Iterator<Item = Arg>) -> EngineResult<BindArgs> {
    let mut args = args.peekable();

    let event_type = match args.next() {
        Some(Arg::Str(s)) => s,
        Some(other) => {
            return Err(EngineError::invalid_argument(
                "event_type",
                format!("expected string, got {}", other.kind()),
            ));
        }
        None => return Err(EngineError::invalid_argument("event_type", "missing")),
    };

    let delay = match args.peek() {
        Some(Arg::Millis(ms)) => {
            let delay = millis_to_delay(*ms)?;
            args.next();
            Some(delay)
        }
        _ => None,
    };

    let callback = match args.next() {
        Some(Arg::Callback(cb)) => cb,
        Some(other) => {
            return Err(EngineError::invalid_argument(
                "callback",
                format!("expected callback, got {}", other.kind()),
            ));
        }
        None => return Err(EngineError::invalid_argument("callback", "missing")),
    };

    if let Some(extra) = args.next() {
        return Err(EngineError::invalid_argument(
            "args",
            format!("unexpected trailing {}", extra.kind()),
        ));
    }

    Ok(BindArgs {
        event_type,
        delay,
        callback,
    })
}
