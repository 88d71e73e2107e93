//! A watcher bound to one rule identifier.
//!
//! Each [`RuleWatcher`] owns a filesystem subscription and a background
//! debounce task. Raw changes flow subscription -> channel -> task, where
//! they are filtered and coalesced; the task is the only writer of `reload`
//! messages for its rule.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::protocol::{FrameWriter, Response};

use super::debouncer::{DEFAULT_QUIET_PERIOD, Debouncer};
use super::error::WatchError;
use super::filter::PatternFilter;
use super::source::{ChangeEvent, ChangeSource, Subscription};

/// Default capacity of a watcher's raw event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// What a rule watches and how it filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub rule_id: String,
    pub directory: PathBuf,
    pub include_pattern: Option<String>,
    pub exclude_pattern: Option<String>,
}

/// Tuning shared by all watchers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period before a burst is reported.
    pub quiet_period: Duration,
    /// Capacity of each watcher's raw event channel.
    pub event_buffer: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Live watcher for a single rule.
pub struct RuleWatcher {
    rule_id: String,
    directory: PathBuf,
    usage: usize,
    subscription: Option<Box<dyn Subscription>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RuleWatcher {
    /// Compile the rule's filter, subscribe to its directory and spawn the
    /// debounce task.
    ///
    /// Must be called from within a tokio runtime. On error nothing is left
    /// running: no subscription and no task.
    pub fn start(
        config: RuleConfig,
        source: &dyn ChangeSource,
        outbound: Arc<FrameWriter>,
        options: WatchOptions,
    ) -> Result<Self, WatchError> {
        let filter = PatternFilter::new(
            config.include_pattern.as_deref(),
            config.exclude_pattern.as_deref(),
        )?;

        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        let subscription = source.subscribe(&config.directory, tx)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(
            config.rule_id.clone(),
            filter,
            rx,
            options.quiet_period,
            outbound,
            cancel.clone(),
        ));

        Ok(Self {
            rule_id: config.rule_id,
            directory: config.directory,
            usage: 1,
            subscription: Some(subscription),
            cancel,
            task: Some(task),
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of `start` requests currently holding this watcher.
    pub fn usage(&self) -> usize {
        self.usage
    }

    /// Register one more user, returning the new usage count.
    pub fn acquire(&mut self) -> usize {
        self.usage += 1;
        self.usage
    }

    /// Release one user, returning the remaining usage count.
    pub fn release(&mut self) -> usize {
        self.usage = self.usage.saturating_sub(1);
        self.usage
    }

    /// Unsubscribe and wait for the debounce task to finish.
    ///
    /// A pending notification is discarded, and once this returns the
    /// watcher will never write another `reload`.
    pub async fn close(mut self) {
        self.subscription.take();
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    crate::failure_event!(error, "watcher", "debounce task panicked", "'{}'", self.rule_id);
                }
            }
        }
    }
}

impl Drop for RuleWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RuleWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleWatcher")
            .field("rule_id", &self.rule_id)
            .field("directory", &self.directory)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

async fn debounce_loop(
    rule_id: String,
    filter: PatternFilter,
    mut events: mpsc::Receiver<ChangeEvent>,
    quiet: Duration,
    outbound: Arc<FrameWriter>,
    cancel: CancellationToken,
) {
    let mut debouncer = Debouncer::new(quiet);

    loop {
        let deadline = debouncer.deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if debouncer.is_armed() {
                    crate::debug_event!("watcher", "discarded pending reload", "{rule_id}");
                }
                break;
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if !debouncer.fire(Instant::now()) || cancel.is_cancelled() {
                    continue;
                }

                let reload = Response::Reload { rule_id: rule_id.clone() };
                match outbound.send(&reload).await {
                    Ok(()) => crate::log_event!("watcher", "reload", "{rule_id}"),
                    Err(e) => crate::failure_event!(error, "watcher", "reload not sent", "'{rule_id}': {e}"),
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };

                if !filter.accepts(&event.path) {
                    crate::trace_event!("watcher", "ignored", "{rule_id} {:?} {}", event.kind, event.path.display());
                    continue;
                }

                if debouncer.record(Instant::now()) {
                    crate::debug_event!("watcher", "armed", "{rule_id} by {}", event.path.display());
                } else {
                    crate::trace_event!("watcher", "re-armed", "{rule_id} by {}", event.path.display());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameReader;
    use crate::watcher::source::{ChangeKind, ManualSource};
    use tokio::io::DuplexStream;

    fn config(rule_id: &str, dir: &str) -> RuleConfig {
        RuleConfig {
            rule_id: rule_id.to_string(),
            directory: PathBuf::from(dir),
            include_pattern: Some(r"\.html$".to_string()),
            exclude_pattern: Some(r"\.tmp$".to_string()),
        }
    }

    fn pipe() -> (Arc<FrameWriter>, FrameReader<DuplexStream>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        (Arc::new(FrameWriter::new(ours)), FrameReader::new(theirs))
    }

    async fn settle() {
        // Let the debounce task drain its channel
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_one_reload() {
        let source = ManualSource::new();
        let (writer, mut reader) = pipe();
        let root = Path::new("/site");
        let watcher = RuleWatcher::start(
            config("rule-1", "/site"),
            &source,
            writer,
            WatchOptions::default(),
        )
        .unwrap();

        for _ in 0..5 {
            source.emit(root, "index.html", ChangeKind::Modified);
            settle().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last_event = Instant::now() - Duration::from_millis(100);

        let frame = reader.read_frame().await.unwrap().unwrap();
        let fired_at = Instant::now();
        assert_eq!(
            Response::decode(&frame).unwrap(),
            Response::Reload {
                rule_id: "rule-1".to_string()
            }
        );
        assert!(fired_at - last_event >= Duration::from_millis(1000));
        assert!(fired_at - last_event < Duration::from_millis(1050));

        // Nothing else follows the single notification
        let next = tokio::time::timeout(Duration::from_secs(5), reader.read_frame()).await;
        assert!(next.is_err());

        watcher.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_changes_reload_twice() {
        let source = ManualSource::new();
        let (writer, mut reader) = pipe();
        let root = Path::new("/site");
        let watcher = RuleWatcher::start(
            config("rule-2", "/site"),
            &source,
            writer,
            WatchOptions::default(),
        )
        .unwrap();

        source.emit(root, "a.html", ChangeKind::Modified);
        settle().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        source.emit(root, "b.html", ChangeKind::Created);
        settle().await;

        for _ in 0..2 {
            let frame = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(
                Response::decode(&frame).unwrap(),
                Response::Reload {
                    rule_id: "rule-2".to_string()
                }
            );
        }

        watcher.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_changes_do_not_reload() {
        let source = ManualSource::new();
        let (writer, mut reader) = pipe();
        let root = Path::new("/site");
        let watcher = RuleWatcher::start(
            config("rule-3", "/site"),
            &source,
            writer,
            WatchOptions::default(),
        )
        .unwrap();

        source.emit(root, "style.css", ChangeKind::Modified);
        source.emit(root, "page.html.tmp", ChangeKind::Modified);
        settle().await;

        let next = tokio::time::timeout(Duration::from_secs(3), reader.read_frame()).await;
        assert!(next.is_err());

        watcher.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_armed_sends_nothing() {
        let source = ManualSource::new();
        let (writer, mut reader) = pipe();
        let root = Path::new("/site");
        let watcher = RuleWatcher::start(
            config("rule-4", "/site"),
            &source,
            writer,
            WatchOptions::default(),
        )
        .unwrap();

        source.emit(root, "index.html", ChangeKind::Modified);
        settle().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        watcher.close().await;
        assert_eq!(source.active_count(), 0);

        let next = tokio::time::timeout(Duration::from_secs(3), reader.read_frame()).await;
        // Either nothing arrives or the stream ends once the writer is gone
        match next {
            Err(_) => {}
            Ok(frame) => assert!(frame.unwrap().is_none()),
        }
    }

    #[tokio::test]
    async fn test_invalid_pattern_leaves_nothing_behind() {
        let source = ManualSource::new();
        let (writer, _reader) = pipe();
        let mut bad = config("rule-5", "/site");
        bad.include_pattern = Some("(".to_string());

        let err = RuleWatcher::start(bad, &source, writer, WatchOptions::default()).unwrap_err();
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
        assert_eq!(source.total_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_usage_counting() {
        let source = ManualSource::new();
        let (writer, _reader) = pipe();
        let mut watcher =
            RuleWatcher::start(config("rule-6", "/site"), &source, writer, WatchOptions::default())
                .unwrap();

        assert_eq!(watcher.usage(), 1);
        assert_eq!(watcher.acquire(), 2);
        assert_eq!(watcher.release(), 1);
        assert_eq!(watcher.release(), 0);
        assert_eq!(watcher.release(), 0);
        assert_eq!(watcher.rule_id(), "rule-6");
        assert_eq!(watcher.directory(), Path::new("/site"));

        watcher.close().await;
    }
}
