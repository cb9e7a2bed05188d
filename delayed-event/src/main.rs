//! src/main.rs
//! Replay driver: binds `click` on a few synthetic elements, plays a scripted
//! click stream through the Tokio timer service and prints every batch.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until, timeout},
};
use tracing::{debug, info};

use delayed_event::{
    DelayedEvents, ElementId, ElementSet, EngineConfig, EventRecord, TokioTimer, init_logging,
};

/// Minimum wait for further flushes once the replay is done.
const MIN_QUIET: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(
    name = "delayed-demo",
    about = "Replay a click stream through the delayed-event engine"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quiet period before a batch is flushed; overrides the config default
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Number of elements to bind
    #[arg(long, default_value_t = 2)]
    elements: u64,

    /// Log level directive, e.g. `debug` or `delayed_event=trace`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.log_level = level.as_str().into();
    }
    let _guard = init_logging(&config.logging)?;

    if cli.elements == 0 {
        bail!("--elements must be at least 1");
    }

    let delay = cli
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(config.default_delay);
    let engine = DelayedEvents::with_config(TokioTimer::new()?, config);
    let elements: ElementSet = (1..=cli.elements).map(ElementId::new).collect();

    let flushes = replay(&engine, &elements, delay).await?;
    for flush in &flushes {
        let offsets: Vec<String> = flush
            .batch
            .iter()
            .filter_map(|ev| ev.attr("offset_ms"))
            .map(|v| format!("{v}ms"))
            .collect();
        println!(
            "{}: {} click(s) [{}] flushed at {}ms",
            flush.element,
            flush.batch.len(),
            offsets.join(", "),
            flush.flushed_at.as_millis()
        );
    }

    let clicks: usize = flushes.iter().map(|f| f.batch.len()).sum();
    let sent = click_script(delay).len() * elements.len();
    if clicks != sent {
        bail!("Flushed {clicks} of {sent} click(s) before the stream went quiet");
    }

    info!("{} batch(es) covering {} click(s)", flushes.len(), clicks);
    info!("Replay finished");
    Ok(())
}

/// One batch as seen by the demo, stamped when the callback ran.
#[derive(Debug)]
struct Flush {
    element: ElementId,
    batch: Vec<EventRecord>,
    flushed_at: Duration,
}

/// Two clicks inside one quiet period, then a straggler after the flush.
fn click_script(delay: Duration) -> [Duration; 3] {
    [Duration::ZERO, delay / 5, delay.saturating_mul(7) / 5]
}

/// Flush callback forwarding each batch with its time since `start`.
fn flush_sink(
    tx: mpsc::UnboundedSender<Flush>,
    start: Instant,
) -> impl Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static {
    move |el, batch| {
        let flush = Flush {
            element: *el,
            batch,
            flushed_at: start.elapsed(),
        };
        if let Err(err) = tx.send(flush) {
            debug!(
                "Dropped batch for {}: receiver closed ({} event(s))",
                el,
                err.0.batch.len()
            );
        }
    }
}

/// Bind `click`, play the script and gather every flush.
async fn replay(
    engine: &DelayedEvents<TokioTimer>,
    elements: &ElementSet,
    delay: Duration,
) -> Result<Vec<Flush>> {
    let start = Instant::now();
    let (tx, rx) = mpsc::unbounded_channel();
    engine.bind(elements, "click", delay, flush_sink(tx, start))?;

    let script = click_script(delay);
    info!("Replaying {} click(s) on {} element(s)", script.len(), elements.len());

    for offset in script {
        sleep_until(start + offset).await;
        for el in elements {
            let offset_ms = u64::try_from(offset.as_millis()).unwrap_or(u64::MAX);
            engine.dispatch(EventRecord::new("click", *el).with_attr("offset_ms", offset_ms));
        }
    }

    collect_flushes(rx, delay.saturating_mul(4).max(MIN_QUIET)).await
}

/// Read flushes until none arrives for `quiet`. Short delays collapse the
/// script into fewer batches, so the count is not known up front.
async fn collect_flushes(
    mut rx: mpsc::UnboundedReceiver<Flush>,
    quiet: Duration,
) -> Result<Vec<Flush>> {
    let mut flushes = Vec::new();
    loop {
        match timeout(quiet, rx.recv()).await {
            Ok(Some(flush)) => flushes.push(flush),
            Ok(None) => bail!("Engine dropped the flush channel"),
            Err(_) => return Ok(flushes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(flush: &Flush) -> Vec<u64> {
        flush
            .batch
            .iter()
            .filter_map(|ev| ev.attr("offset_ms").and_then(|v| v.as_u64()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_reports_callback_flush_time() {
        let engine = DelayedEvents::new(TokioTimer::new().unwrap());
        let elements = ElementSet::single(ElementId(1));

        let flushes = replay(&engine, &elements, Duration::from_millis(500))
            .await
            .unwrap();

        assert_eq!(flushes.len(), 2);
        assert_eq!(offsets(&flushes[0]), vec![0, 100]);
        assert_eq!(offsets(&flushes[1]), vec![700]);

        // Stamped when the timer fired, not after the quiet wait
        let first = flushes[0].flushed_at;
        let second = flushes[1].flushed_at;
        assert!(first >= Duration::from_millis(600) && first < Duration::from_millis(700));
        assert!(second >= Duration::from_millis(1200) && second < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_zero_delay_accounts_for_every_click() {
        let engine = DelayedEvents::new(TokioTimer::new().unwrap());
        let elements: ElementSet = [1, 2].into_iter().map(ElementId::new).collect();

        let flushes = replay(&engine, &elements, Duration::ZERO).await.unwrap();

        let clicks: usize = flushes.iter().map(|f| f.batch.len()).sum();
        assert_eq!(clicks, click_script(Duration::ZERO).len() * elements.len());
        assert!(flushes.iter().any(|f| f.element == ElementId(1)));
        assert!(flushes.iter().any(|f| f.element == ElementId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_stops_after_quiet_window() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = flush_sink(tx.clone(), Instant::now());
        sink(&ElementId(3), vec![EventRecord::new("click", ElementId(3))]);

        let flushes = collect_flushes(rx, MIN_QUIET).await.unwrap();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].element, ElementId(3));
        drop(tx);
    }

    #[tokio::test]
    async fn test_collect_fails_when_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel::<Flush>();
        drop(tx);
        assert!(collect_flushes(rx, MIN_QUIET).await.is_err());
    }

    #[tokio::test]
    async fn test_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = flush_sink(tx, Instant::now());
        sink(&ElementId(1), vec![EventRecord::new("click", ElementId(1))]);
        sink(&ElementId(1), Vec::new());
    }
}
