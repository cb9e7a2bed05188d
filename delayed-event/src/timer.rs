//! Timer service: schedule-once / cancel primitives consumed by the engine.
//!
//! Two implementations ship with the crate:
//! - [`TokioTimer`]: real time, one spawned task per timer, cancelled through
//!   a `CancellationToken`.
//! - [`ManualTimer`]: virtual clock advanced explicitly by the host; used by
//!   single-threaded hosts and by the deterministic tests.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ahash::{AHashMap, RandomState};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Work run once when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled timer, valid until it fires or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Schedule-once / cancel primitives.
pub trait TimerService: Send + Sync + 'static {
    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Invalidate `handle` before it fires. Returns false if it already fired
    /// or was cancelled.
    fn cancel(&self, handle: TimerHandle) -> bool;
}

impl<S: TimerService + ?Sized> TimerService for Arc<S> {
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        (**self).schedule_once(delay, task)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        (**self).cancel(handle)
    }
}

/* ============================ TokioTimer ============================ */

/// Tokio-backed timers.
pub struct TokioTimer {
    runtime: Handle,
    live: Arc<DashMap<TimerHandle, CancellationToken, RandomState>>,
    next_id: AtomicU64,
}

impl TokioTimer {
    /// Bind to the runtime of the calling context.
    pub fn new() -> EngineResult<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            live: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.live.len()
    }
}

impl fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimer")
            .field("pending", &self.live.len())
            .finish()
    }
}

impl TimerService for TokioTimer {
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();

        // Registered before spawning so a zero delay cannot outrun it
        self.live.insert(handle, token.clone());
        trace!("timer {} scheduled in {:?}", handle.0, delay);

        let live = Arc::clone(&self.live);
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!("timer {} cancelled", handle.0);
                }
                _ = tokio::time::sleep(delay) => {
                    // Losing this race to `cancel` means the timer is dead
                    if live.remove(&handle).is_some() {
                        trace!("timer {} fired", handle.0);
                        task();
                    }
                }
            }
        });

        handle
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        match self.live.remove(&handle) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/* ============================ ManualTimer =========================== */

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    // (deadline, id): ties fire in scheduling order
    queue: BTreeMap<(Duration, u64), TimerTask>,
    deadlines: AHashMap<u64, Duration>,
}

/// Virtual-clock timers. Nothing fires until [`ManualTimer::advance`].
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<ManualState>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.lock().queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Move the clock forward by `by`, firing every timer that falls due,
    /// including timers scheduled by tasks fired along the way. Returns the
    /// number of timers fired.
    ///
    /// The clock reads each task's deadline while that task runs. No lock is
    /// held while a task runs, so tasks may schedule and cancel freely.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now.saturating_add(by);
        let mut fired = 0;

        loop {
            let task = {
                let mut st = self.state.lock();
                let due = match st.queue.keys().next() {
                    Some(&(deadline, id)) if deadline <= target => (deadline, id),
                    _ => break,
                };
                st.deadlines.remove(&due.1);
                st.now = due.0;
                st.queue.remove(&due)
            };

            if let Some(task) = task {
                fired += 1;
                task();
            }
        }

        let mut st = self.state.lock();
        if st.now < target {
            st.now = target;
        }
        fired
    }

    /// Milliseconds convenience for [`ManualTimer::advance`].
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.advance(Duration::from_millis(ms))
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ManualTimer")
            .field("now", &st.now)
            .field("pending", &st.queue.len())
            .finish()
    }
}

impl TimerService for ManualTimer {
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut st = self.state.lock();
        let id = st.next_id;
        st.next_id += 1;

        // Far-future delays park at Duration::MAX instead of overflowing
        let deadline = st.now.saturating_add(delay);
        st.queue.insert((deadline, id), task);
        st.deadlines.insert(id, deadline);
        trace!("manual timer {} scheduled for {:?}", id, deadline);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let mut st = self.state.lock();
        match st.deadlines.remove(&handle.0) {
            Some(deadline) => st.queue.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }
}
