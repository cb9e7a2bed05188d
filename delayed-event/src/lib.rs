//! # delayed-event - per-element event debouncing and batching
//!
//! Binds a listener for a named event type to elements, buffers every
//! occurrence and hands the accumulated batch to a callback once the stream
//! has been quiet for a fixed delay. Re-triggering before the delay elapses
//! resets the timer and keeps accumulating.
//!
//! ## Key Features
//! - Independent buffer and timer per (element, event type, bind call)
//! - `stop` discards the pending batch without unbinding
//! - Pluggable timer service (Tokio or a manually advanced clock)
//! - TOML configuration and tracing-based logging

pub mod binding;
pub mod command;
pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod timer;

mod registry;

// Re-export main types for easy use
pub use binding::{BatchCallback, BindingId, BindingPhase, BindingSnapshot};
pub use command::{Arg, BindArgs, Command, Operation};
pub use config::EngineConfig;
pub use element::{ElementId, ElementSet};
pub use engine::DelayedEvents;
pub use error::{EngineError, EngineResult};
pub use event::EventRecord;
pub use logging::{LogRotation, LoggerConfig, init_logging};
pub use timer::{ManualTimer, TimerHandle, TimerService, TimerTask, TokioTimer};
