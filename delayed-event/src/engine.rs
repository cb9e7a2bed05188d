//! The debounce engine.
//!
//! [`DelayedEvents`] binds listeners for a named event type to elements and
//! batches every occurrence. A binding's callback runs with the accumulated
//! batch once the stream has been quiet for the binding's delay; each new
//! occurrence before that pushes the deadline out again.
//!
//! ## Flow
//! - The event source calls [`DelayedEvents::dispatch`] for each occurrence.
//! - Every matching binding cancels its pending flush, appends the record and
//!   schedules a fresh flush through the [`TimerService`].
//! - On fire, the binding goes back to Idle and the callback receives the
//!   whole batch, in arrival order.
//! - [`DelayedEvents::stop`] cancels the pending flush and drops the buffer
//!   without calling back. Listeners stay attached.
//!
//! ## Example
//! ```rust,ignore
//! let engine = DelayedEvents::new(TokioTimer::new()?);
//! let input = ElementSet::single(ElementId::new(1));
//!
//! engine.bind(&input, "keyup", Duration::from_millis(1000), |el, events| {
//!     println!("{el}: {} key(s)", events.len());
//! })?;
//! engine.dispatch(EventRecord::new("keyup", ElementId::new(1)));
//! ```

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    binding::{BindingId, BindingSnapshot, BindingState, PendingFlush},
    command::{Arg, BindArgs, Command},
    config::EngineConfig,
    element::{ElementId, ElementSet},
    error::{EngineError, EngineResult},
    event::EventRecord,
    registry::{BindingRegistry, SharedBinding},
    timer::{TimerService, TimerTask},
};

struct Inner<T> {
    timer: T,
    config: EngineConfig,
    registry: Mutex<BindingRegistry>,
    next_binding: AtomicU64,
}

/// Per-element event debouncer. Cheap to clone; clones share state.
pub struct DelayedEvents<T: TimerService> {
    inner: Arc<Inner<T>>,
}

impl<T: TimerService> Clone for DelayedEvents<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TimerService> fmt::Debug for DelayedEvents<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedEvents")
            .field("elements", &self.inner.registry.lock().element_count())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T: TimerService> DelayedEvents<T> {
    pub fn new(timer: T) -> Self {
        Self::with_config(timer, EngineConfig::default())
    }

    pub fn with_config(timer: T, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                timer,
                config,
                registry: Mutex::new(BindingRegistry::default()),
                next_binding: AtomicU64::new(1),
            }),
        }
    }

    pub fn timer(&self) -> &T {
        &self.inner.timer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Attach a debounced listener for `event_type` to every element.
    ///
    /// Each element gets its own binding with its own buffer and timer.
    /// Binding the same event type again adds another independent binding.
    pub fn bind<F>(
        &self,
        elements: &ElementSet,
        event_type: &str,
        delay: Duration,
        callback: F,
    ) -> EngineResult<ElementSet>
    where
        F: Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    {
        self.bind_with(elements, BindArgs::new(event_type, delay, callback))
    }

    /// [`DelayedEvents::bind`] from prepared arguments.
    pub fn bind_with(&self, elements: &ElementSet, args: BindArgs) -> EngineResult<ElementSet> {
        let delay = args.delay.unwrap_or(self.inner.config.default_delay);
        if let Err(err) = self.validate(&args.event_type, delay) {
            warn!("Rejected bind of '{}': {}", args.event_type, err);
            return Err(err);
        }

        let mut registry = self.inner.registry.lock();
        for element in elements {
            let id = BindingId(self.inner.next_binding.fetch_add(1, Ordering::Relaxed));
            let state = BindingState::new(
                id,
                *element,
                args.event_type.clone(),
                delay,
                Arc::clone(&args.callback),
            );
            registry.attach(*element, Arc::new(Mutex::new(state)));

            debug!(
                "Bound '{}' on {} (binding {}, delay {:?})",
                args.event_type,
                element,
                id.get(),
                delay
            );
        }

        Ok(elements.clone())
    }

    /// Cancel pending flushes and discard buffered events on every binding of
    /// each element. Listeners stay attached. Unknown elements are skipped.
    pub fn stop(&self, elements: &ElementSet) -> ElementSet {
        for element in elements {
            let bindings = self.inner.registry.lock().bindings(element);
            if bindings.is_empty() {
                continue;
            }

            let discarded: usize = bindings.iter().map(|b| self.reset(b)).sum();
            debug!("Stopped {} ({} buffered event(s) discarded)", element, discarded);
        }

        elements.clone()
    }

    /// Deliver one occurrence from the event source. Returns how many
    /// bindings took it.
    pub fn dispatch(&self, event: EventRecord) -> usize {
        let listeners = self
            .inner
            .registry
            .lock()
            .listeners(&event.target, &event.event_type);

        for binding in &listeners {
            self.enqueue(binding, event.clone());
        }

        listeners.len()
    }

    /// Detach listeners for `event_type` (all when `None`) from each element.
    /// Pending batches are dropped without calling back.
    pub fn unbind(&self, elements: &ElementSet, event_type: Option<&str>) -> ElementSet {
        for element in elements {
            let removed = self.inner.registry.lock().detach(element, event_type);
            for binding in &removed {
                self.reset(binding);
            }
            if !removed.is_empty() {
                debug!("Unbound {} binding(s) from {}", removed.len(), element);
            }
        }

        elements.clone()
    }

    /// Drop every trace of each element, as when it is destroyed.
    pub fn forget(&self, elements: &ElementSet) -> ElementSet {
        for element in elements {
            let removed = self.inner.registry.lock().remove(element);
            for binding in &removed {
                self.reset(binding);
            }
            trace!("Forgot {}", element);
        }

        elements.clone()
    }

    /// State of each binding on `element`, in bind order.
    pub fn snapshot(&self, element: &ElementId) -> Vec<BindingSnapshot> {
        let bindings = self.inner.registry.lock().bindings(element);
        bindings.iter().map(|b| b.lock().snapshot()).collect()
    }

    /// True while any binding on `element` holds an unflushed batch.
    pub fn is_pending(&self, element: &ElementId) -> bool {
        let bindings = self.inner.registry.lock().bindings(element);
        bindings.iter().any(|b| b.lock().pending.is_some())
    }

    pub fn is_bound(&self, element: &ElementId) -> bool {
        self.inner.registry.lock().contains(element)
    }

    pub fn execute(&self, elements: &ElementSet, command: Command) -> EngineResult<ElementSet> {
        match command {
            Command::Bind(args) => self.bind_with(elements, args),
            Command::Stop => Ok(self.stop(elements)),
        }
    }

    /// Positional dispatch: a leading operation name selects it, anything
    /// else is taken as `bind` arguments (see [`Command::parse`]).
    pub fn invoke(&self, elements: &ElementSet, args: Vec<Arg>) -> EngineResult<ElementSet> {
        let command = Command::parse(args, self.inner.config.strict_operations)?;
        self.execute(elements, command)
    }

    fn validate(&self, event_type: &str, delay: Duration) -> EngineResult<()> {
        if event_type.is_empty() {
            return Err(EngineError::invalid_argument("event_type", "must not be empty"));
        }

        if let Some(bad) = event_type
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')))
        {
            return Err(EngineError::invalid_argument(
                "event_type",
                format!("unexpected character {bad:?} in '{event_type}'"),
            ));
        }

        match self.inner.config.max_delay {
            Some(max) if delay > max => Err(EngineError::invalid_argument(
                "delay",
                format!("{delay:?} exceeds the configured maximum of {max:?}"),
            )),
            _ => Ok(()),
        }
    }

    fn enqueue(&self, binding: &SharedBinding, event: EventRecord) {
        let mut st = binding.lock();

        // Scheduled under the binding lock: a flush that fires at once still
        // has to wait for `pending` to be recorded. State is only touched
        // once the timer service has accepted the flush.
        let ticket = st.issue_ticket();
        let task = flush_task(Arc::downgrade(binding), ticket);
        let timer = self.inner.timer.schedule_once(st.delay, task);

        if let Some(prev) = st.pending.replace(PendingFlush { ticket, timer }) {
            self.inner.timer.cancel(prev.timer);
        }
        st.buffer.push(event);

        trace!(
            "Buffered '{}' on {} ({} pending, flush in {:?})",
            st.event_type,
            st.element,
            st.buffer.len(),
            st.delay
        );
    }

    /// Back to Idle without a flush. Returns how many events were dropped.
    fn reset(&self, binding: &SharedBinding) -> usize {
        let mut st = binding.lock();
        let dropped = st.buffer.len();
        if let Some(timer) = st.reset() {
            self.inner.timer.cancel(timer);
        }
        dropped
    }
}

fn flush_task(binding: Weak<Mutex<BindingState>>, ticket: u64) -> TimerTask {
    Box::new(move || {
        let Some(binding) = binding.upgrade() else {
            return;
        };

        let (element, callback, batch) = {
            let mut st = binding.lock();
            match st.take_batch(ticket) {
                Some(batch) => (st.element, Arc::clone(&st.callback), batch),
                None => {
                    trace!("Superseded flush on {} ignored", st.element);
                    return;
                }
            }
        };

        debug!("Flushing {} event(s) on {}", batch.len(), element);
        // No lock held: the callback may re-enter the engine
        callback(&element, batch);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{binding::BindingPhase, timer::ManualTimer};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    /// (element, batch, virtual time of the flush)
    type Flushes = Arc<Mutex<Vec<(ElementId, Vec<EventRecord>, Duration)>>>;

    fn engine() -> (DelayedEvents<Arc<ManualTimer>>, Arc<ManualTimer>) {
        let timer = Arc::new(ManualTimer::new());
        (DelayedEvents::new(Arc::clone(&timer)), timer)
    }

    fn recorder(
        timer: &Arc<ManualTimer>,
    ) -> (
        Flushes,
        impl Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static,
    ) {
        let flushes: Flushes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flushes);
        let clock = Arc::clone(timer);
        (flushes, move |el: &ElementId, batch: Vec<EventRecord>| {
            sink.lock().push((*el, batch, clock.now()));
        })
    }

    fn el(id: u64) -> ElementSet {
        ElementSet::single(ElementId(id))
    }

    fn fire(engine: &DelayedEvents<Arc<ManualTimer>>, id: u64, ty: &str, seq: i64) -> usize {
        engine.dispatch(EventRecord::new(ty, ElementId(id)).with_attr("seq", seq))
    }

    fn seqs(batch: &[EventRecord]) -> Vec<i64> {
        batch
            .iter()
            .filter_map(|ev| ev.attr("seq").and_then(|v| v.as_i64()))
            .collect()
    }

    #[test]
    fn test_burst_flushes_once_after_quiet_period() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(300), cb).unwrap();

        for seq in 0..5 {
            assert_eq!(fire(&engine, 1, "click", seq), 1);
            timer.advance_ms(100);
        }
        // last occurrence at 400ms; nothing before 700ms
        timer.advance_ms(199);
        assert!(flushes.lock().is_empty());

        timer.advance_ms(1);
        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 1);
        assert_eq!(seqs(&flushes[0].1), vec![0, 1, 2, 3, 4]);
        assert_eq!(flushes[0].2, Duration::from_millis(700));
    }

    #[test]
    fn test_each_occurrence_resets_deadline() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(1000), cb).unwrap();

        fire(&engine, 1, "click", 0);
        timer.advance_ms(500);
        fire(&engine, 1, "click", 1);

        timer.advance_ms(500);
        assert!(flushes.lock().is_empty(), "must not flush at D from t=0");
        assert!(engine.is_pending(&ElementId(1)));

        timer.advance_ms(500);
        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].2, Duration::from_millis(1500));
    }

    #[test]
    fn test_idle_after_flush_then_fresh_batch() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "keyup", Duration::from_millis(200), cb).unwrap();

        fire(&engine, 1, "keyup", 0);
        fire(&engine, 1, "keyup", 1);
        timer.advance_ms(200);

        let snap = engine.snapshot(&ElementId(1));
        assert_eq!(snap[0].phase, BindingPhase::Idle);
        assert_eq!(snap[0].buffered, 0);
        assert_eq!(timer.pending(), 0);

        fire(&engine, 1, "keyup", 2);
        timer.advance_ms(200);

        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 2);
        assert_eq!(seqs(&flushes[1].1), vec![2]);
    }

    #[test]
    fn test_stop_discards_pending_batch() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(1000), cb).unwrap();

        fire(&engine, 1, "click", 0);
        timer.advance_ms(400);
        let returned = engine.stop(&el(1));
        assert_eq!(returned, el(1));
        assert_eq!(engine.snapshot(&ElementId(1))[0].buffered, 0);
        assert_eq!(timer.pending(), 0);

        timer.advance_ms(2000);
        assert!(flushes.lock().is_empty());

        // listener survives stop
        fire(&engine, 1, "click", 1);
        timer.advance_ms(1000);
        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 1);
        assert_eq!(seqs(&flushes[0].1), vec![1]);
    }

    #[test]
    fn test_stop_unknown_or_idle_is_noop() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);

        let set: ElementSet = [ElementId(8), ElementId(9)].into_iter().collect();
        assert_eq!(engine.stop(&set), set);

        engine.bind(&el(1), "click", Duration::from_millis(10), cb).unwrap();
        engine.stop(&el(1));
        fire(&engine, 1, "click", 0);
        timer.advance_ms(10);
        assert_eq!(flushes.lock().len(), 1);
    }

    #[test]
    fn test_double_bind_gives_independent_batches() {
        let (engine, timer) = engine();
        let (first, cb1) = recorder(&timer);
        let (second, cb2) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(100), cb1).unwrap();
        engine.bind(&el(1), "click", Duration::from_millis(300), cb2).unwrap();

        for seq in 0..3 {
            assert_eq!(fire(&engine, 1, "click", seq), 2);
        }

        timer.advance_ms(100);
        assert_eq!(first.lock().len(), 1);
        assert!(second.lock().is_empty());

        timer.advance_ms(200);
        assert_eq!(seqs(&first.lock()[0].1), vec![0, 1, 2]);
        assert_eq!(seqs(&second.lock()[0].1), vec![0, 1, 2]);

        let ids: Vec<BindingId> = engine.snapshot(&ElementId(1)).iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_elements_are_isolated() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        let set: ElementSet = (1..=3).map(ElementId).collect();
        engine.bind(&set, "click", Duration::from_millis(100), cb).unwrap();

        fire(&engine, 2, "click", 0);
        assert!(!engine.is_pending(&ElementId(1)));
        assert!(engine.is_pending(&ElementId(2)));
        assert!(!engine.is_pending(&ElementId(3)));

        timer.advance_ms(100);
        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].0, ElementId(2));
        assert!(flushes[0].1.iter().all(|ev| ev.target == ElementId(2)));
    }

    #[test]
    fn test_click_scenario_timeline() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(500), cb).unwrap();

        fire(&engine, 1, "click", 0);
        timer.advance_ms(100);
        fire(&engine, 1, "click", 100);
        assert_eq!(timer.pending(), 1, "t=0 timer replaced, not stacked");
        assert_eq!(timer.next_deadline(), Some(Duration::from_millis(600)));

        timer.advance_ms(600);
        fire(&engine, 1, "click", 700);
        timer.advance_ms(500);

        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 2);
        assert_eq!(seqs(&flushes[0].1), vec![0, 100]);
        assert_eq!(flushes[0].2, Duration::from_millis(600));
        assert_eq!(seqs(&flushes[1].1), vec![700]);
        assert_eq!(flushes[1].2, Duration::from_millis(1200));
    }

    #[test]
    fn test_other_event_types_ignored() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "click", Duration::from_millis(10), cb).unwrap();

        assert_eq!(fire(&engine, 1, "mouseenter", 0), 0);
        assert_eq!(fire(&engine, 5, "click", 0), 0);
        timer.advance_ms(50);
        assert!(flushes.lock().is_empty());
    }

    #[test]
    fn test_zero_delay_flushes_on_next_tick() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        engine.bind(&el(1), "input", Duration::ZERO, cb).unwrap();

        fire(&engine, 1, "input", 0);
        fire(&engine, 1, "input", 1);
        assert!(flushes.lock().is_empty());

        timer.advance(Duration::ZERO);
        assert_eq!(seqs(&flushes.lock()[0].1), vec![0, 1]);
    }

    #[test]
    fn test_validation_rejects_whole_call() {
        let timer = Arc::new(ManualTimer::new());
        let config = EngineConfig {
            max_delay: Some(Duration::from_secs(1)),
            ..EngineConfig::default()
        };
        let engine = DelayedEvents::with_config(Arc::clone(&timer), config);
        let set: ElementSet = (1..=2).map(ElementId).collect();

        for bad in ["", "key up", "click!"] {
            let err = engine.bind(&set, bad, Duration::from_millis(5), |_, _| {}).unwrap_err();
            assert!(err.is_validation(), "{bad:?} accepted");
        }
        let err = engine
            .bind(&set, "click", Duration::from_secs(2), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { ref field, .. } if field == "delay"));

        assert!(!engine.is_bound(&ElementId(1)));
        assert!(!engine.is_bound(&ElementId(2)));

        // namespaced types are fine
        assert!(engine.bind(&set, "click.menu", Duration::from_secs(1), |_, _| {}).is_ok());
    }

    #[test]
    fn test_invoke_positional_dispatch() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);

        let out = engine
            .invoke(&el(1), vec!["click".into(), 250i64.into(), Arg::callback(cb)])
            .unwrap();
        assert_eq!(out, el(1));
        assert_eq!(engine.snapshot(&ElementId(1))[0].delay, Duration::from_millis(250));

        fire(&engine, 1, "click", 0);
        engine.invoke(&el(1), vec!["stop".into()]).unwrap();
        timer.advance_ms(1000);
        assert!(flushes.lock().is_empty());

        let err = engine
            .invoke(&el(1), vec!["click".into(), (-5i64).into(), Arg::callback(|_, _| {})])
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.snapshot(&ElementId(1)).len(), 1);
    }

    #[test]
    fn test_bind_without_delay_uses_configured_default() {
        let (engine, _timer) = engine();
        engine
            .execute(&el(1), Command::Bind(BindArgs::with_default_delay("keyup", |_, _| {})))
            .unwrap();
        assert_eq!(
            engine.snapshot(&ElementId(1))[0].delay,
            engine.config().default_delay
        );
    }

    #[test]
    fn test_unbind_and_forget() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        let cb = Arc::new(cb);
        let (c1, c2) = (Arc::clone(&cb), Arc::clone(&cb));
        engine.bind(&el(1), "click", Duration::from_millis(50), move |e, b| c1(e, b)).unwrap();
        engine.bind(&el(1), "keyup", Duration::from_millis(50), move |e, b| c2(e, b)).unwrap();

        fire(&engine, 1, "click", 0);
        engine.unbind(&el(1), Some("click"));
        assert_eq!(timer.pending(), 0);
        assert_eq!(fire(&engine, 1, "click", 1), 0);
        assert_eq!(fire(&engine, 1, "keyup", 2), 1);

        engine.forget(&el(1));
        assert!(!engine.is_bound(&ElementId(1)));
        assert_eq!(fire(&engine, 1, "keyup", 3), 0);

        timer.advance_ms(100);
        assert!(flushes.lock().is_empty());
    }

    #[test]
    fn test_callback_may_reenter_engine() {
        let (engine, timer) = engine();
        let (flushes, record) = recorder(&timer);
        let handle = engine.clone();

        engine
            .bind(&el(1), "click", Duration::from_millis(100), move |el, batch| {
                let first = batch.len() == 1 && seqs(&batch) == vec![0];
                record(el, batch);
                if first {
                    // follow-up occurrence from inside the flush
                    handle.dispatch(EventRecord::new("click", *el).with_attr("seq", 1));
                }
            })
            .unwrap();

        fire(&engine, 1, "click", 0);
        timer.advance_ms(300);

        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 2);
        assert_eq!(seqs(&flushes[1].1), vec![1]);
        assert_eq!(flushes[1].2, Duration::from_millis(200));
    }

    #[test]
    fn test_stop_from_callback() {
        let (engine, timer) = engine();
        let (flushes, record) = recorder(&timer);
        let handle = engine.clone();

        engine
            .bind(&el(1), "click", Duration::from_millis(100), move |el, batch| {
                record(el, batch);
                handle.stop(&ElementSet::single(*el));
            })
            .unwrap();

        fire(&engine, 1, "click", 0);
        fire(&engine, 1, "click", 1);
        timer.advance_ms(100);

        let snap = engine.snapshot(&ElementId(1));
        assert_eq!(snap[0].phase, BindingPhase::Idle);
        assert_eq!(snap[0].buffered, 0);
        assert_eq!(timer.pending(), 0);

        fire(&engine, 1, "click", 2);
        timer.advance_ms(100);

        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 2);
        assert_eq!(seqs(&flushes[0].1), vec![0, 1]);
        assert_eq!(seqs(&flushes[1].1), vec![2]);
    }

    #[test]
    fn test_far_future_delay_keeps_binding_consistent() {
        let (engine, timer) = engine();
        let (flushes, cb) = recorder(&timer);
        timer.advance_ms(1);
        engine.bind(&el(1), "click", Duration::MAX, cb).unwrap();

        assert_eq!(fire(&engine, 1, "click", 0), 1);
        let snap = engine.snapshot(&ElementId(1));
        assert_eq!(snap[0].phase, BindingPhase::Accumulating);
        assert_eq!(snap[0].buffered, 1);
        assert_eq!(timer.next_deadline(), Some(Duration::MAX));

        timer.advance(Duration::from_secs(3600));
        assert!(flushes.lock().is_empty());

        engine.stop(&el(1));
        assert_eq!(timer.pending(), 0);
        assert_eq!(engine.snapshot(&ElementId(1))[0].buffered, 0);
    }

    #[test]
    fn test_callback_panic_leaves_binding_idle() {
        let (engine, timer) = engine();
        engine
            .bind(&el(1), "click", Duration::from_millis(10), |_, _| panic!("boom"))
            .unwrap();

        fire(&engine, 1, "click", 0);
        let result = catch_unwind(AssertUnwindSafe(|| timer.advance_ms(10)));
        assert!(result.is_err());

        let snap = engine.snapshot(&ElementId(1));
        assert_eq!(snap[0].phase, BindingPhase::Idle);
        assert_eq!(snap[0].buffered, 0);
        assert_eq!(fire(&engine, 1, "click", 1), 1);
        assert!(engine.is_pending(&ElementId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_click_scenario() {
        use crate::timer::TokioTimer;
        use tokio::time::{Instant, sleep};

        let engine = DelayedEvents::new(TokioTimer::new().unwrap());
        let start = Instant::now();
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flushes);
        engine
            .bind(&el(1), "click", Duration::from_millis(500), move |_, batch| {
                sink.lock().push((start.elapsed(), batch.len()));
            })
            .unwrap();

        let click = || EventRecord::new("click", ElementId(1));
        engine.dispatch(click());
        sleep(Duration::from_millis(100)).await;
        engine.dispatch(click());
        sleep(Duration::from_millis(600)).await;
        engine.dispatch(click());
        sleep(Duration::from_millis(600)).await;

        let flushes = flushes.lock();
        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].1, 2);
        assert!(flushes[0].0 >= Duration::from_millis(600) && flushes[0].0 < Duration::from_millis(700));
        assert_eq!(flushes[1].1, 1);
        assert!(flushes[1].0 >= Duration::from_millis(1200) && flushes[1].0 < Duration::from_millis(1300));
        assert_eq!(engine.timer().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_stop_cancels() {
        use crate::timer::TokioTimer;

        let engine = DelayedEvents::new(TokioTimer::new().unwrap());
        let hits = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&hits);
        engine
            .bind(&el(1), "mouseenter", Duration::from_millis(1000), move |_, _| {
                *sink.lock() += 1;
            })
            .unwrap();

        engine.dispatch(EventRecord::new("mouseenter", ElementId(1)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop(&el(1));
        assert_eq!(engine.timer().pending(), 0);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(*hits.lock(), 0);
    }
}
