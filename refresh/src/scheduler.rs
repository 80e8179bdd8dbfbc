use crate::{
    detector::has_changed,
    locator::ArtifactLocator,
    ArtifactIdentity,
    RefreshError,
    SnapshotStore,
    StatisticsSnapshot,
};
use chrono::Utc;
use eyre::eyre;
use fsimage_exporter_stats::ImageAnalyzer;
use futures::FutureExt as _;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefreshPhase {
    #[default]
    Idle,
    Locating,
    Parsing,
    Publishing,
    /// The last cycle failed. Cleared by the next tick.
    Backoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NotFound,
    Unchanged(ArtifactIdentity),
    Published(ArtifactIdentity),
    Failed(String),
}

/// Drives locate, detect, analyze and publish. Exactly one cycle runs at a time.
pub struct RefreshScheduler {
    locator: Box<dyn ArtifactLocator>,
    analyzer: Arc<dyn ImageAnalyzer>,
    store: Arc<SnapshotStore>,
    phase: watch::Sender<RefreshPhase>,
}

impl RefreshScheduler {
    pub fn new(locator: Box<dyn ArtifactLocator>, analyzer: Arc<dyn ImageAnalyzer>, store: Arc<SnapshotStore>) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::default());
        Self {
            locator,
            analyzer,
            store,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    /// Runs one cycle. Errors are recorded in the store and never returned.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        self.phase.send_replace(RefreshPhase::Locating);

        let candidate = match self.locator.locate_newest().await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                debug!(locator = self.locator.name(), "no fsimage available yet");
                self.phase.send_replace(RefreshPhase::Idle);
                return CycleOutcome::NotFound;
            }
            Err(err) => return self.fail(err, started),
        };

        let previous = self.store.last_processed();
        if !has_changed(previous.as_deref(), &candidate) {
            debug!(identity = %candidate.identity, "fsimage unchanged");
            self.phase.send_replace(RefreshPhase::Idle);
            return CycleOutcome::Unchanged(candidate.identity);
        }

        info!(
            identity = %candidate.identity,
            path = %candidate.path.display(),
            bytes = candidate.size_bytes,
            "analyzing new fsimage"
        );
        self.phase.send_replace(RefreshPhase::Parsing);

        let analysis = tokio::task::spawn_blocking({
            let analyzer = self.analyzer.clone();
            let path = candidate.path.clone();
            move || {
                let started = Instant::now();
                analyzer.analyze(&path).map(|report| (report, started.elapsed()))
            }
        })
        .await;

        let (report, load_duration) = match analysis {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(err)) => return self.fail(RefreshError::ParseFailed(err), started),
            Err(err) => {
                return self.fail(
                    RefreshError::ParseFailed(eyre!("The analyzer did not finish: {err}")),
                    started,
                )
            }
        };

        self.phase.send_replace(RefreshPhase::Publishing);
        let identity = candidate.identity;
        self.store.publish(StatisticsSnapshot {
            identity: identity.clone(),
            computed_at: Utc::now(),
            load_duration,
            file_size_bytes: candidate.size_bytes,
            report,
        });
        // Advanced only now, so a failed analysis is retried on the next tick.
        self.store.mark_processed(identity.clone());
        self.store.record_success(started.elapsed());

        info!(%identity, load_duration = ?load_duration, "published fsimage statistics");
        self.phase.send_replace(RefreshPhase::Idle);
        CycleOutcome::Published(identity)
    }

    fn fail(&self, err: RefreshError, started: Instant) -> CycleOutcome {
        match &err {
            RefreshError::FetchFailed(_) | RefreshError::Listing { .. } => {
                warn!(locator = self.locator.name(), "Refresh cycle failed: {err}")
            }
            _ => error!("Refresh cycle failed: {err}"),
        }
        self.store.record_failure(&err, started.elapsed());
        self.phase.send_replace(RefreshPhase::Backoff);
        CycleOutcome::Failed(err.to_string())
    }

    /// Spawns the refresh loop. The first cycle starts immediately, later ones every `period`.
    pub fn spawn(mut self, period: Duration) -> Result<SchedulerHandle, RefreshError> {
        if period.is_zero() {
            return Err(RefreshError::invalid_configuration("refresh interval must be greater than zero"));
        }

        let cancellation_token = CancellationToken::new();
        let guard = cancellation_token.clone().drop_guard();
        let phase = self.subscribe();

        let task = tokio::task::spawn({
            let cancellation_token = cancellation_token.clone();
            async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancellation_token.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    let started = Instant::now();
                    let cycle = tokio::select! {
                        biased;
                        _ = cancellation_token.cancelled() => break,
                        cycle = AssertUnwindSafe(self.run_cycle()).catch_unwind() => cycle,
                    };
                    let outcome = match cycle {
                        Ok(outcome) => outcome,
                        Err(payload) => self.fail(RefreshError::Panicked(panic_message(payload.as_ref())), started),
                    };
                    trace!(?outcome, "refresh cycle finished");
                }

                debug!("Refresh task canceled");
            }
        });

        Ok(SchedulerHandle {
            phase,
            cancellation_token,
            _guard: guard,
            task: Some(task),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string())
}

/// Owns the refresh task. Dropping it stops the loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    pub phase: watch::Receiver<RefreshPhase>,
    cancellation_token: CancellationToken,
    _guard: DropGuard,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!("Refresh task ended abnormally: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ArtifactReference,
        LocalDirectoryLocator,
    };
    use eyre::bail;
    use fsimage_exporter_stats::FsImageReport;
    use pretty_assertions::assert_eq;
    use std::{
        future::Future,
        path::Path,
        pin::Pin,
        sync::atomic::{
            AtomicUsize,
            Ordering,
        },
    };
    use temp_dir::TempDir;

    /// Counts calls and reports the image size as the file count. Fails for names in `broken`
    /// and for the first `fail_first` calls.
    #[derive(Default)]
    struct FakeAnalyzer {
        calls: AtomicUsize,
        fail_first: usize,
        broken: Vec<&'static str>,
        panics: bool,
    }

    impl ImageAnalyzer for FakeAnalyzer {
        fn analyze(&self, image: &Path) -> eyre::Result<FsImageReport> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("analyzer exploded");
            }
            if call < self.fail_first {
                bail!("transient failure");
            }
            let name = image.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if self.broken.iter().any(|broken| *broken == name) {
                bail!("{name} is corrupt");
            }
            let mut report = FsImageReport::default();
            report.overall.files = std::fs::metadata(image)?.len();
            Ok(report)
        }
    }

    /// Replays a fixed sequence of locate results.
    struct ScriptedLocator(Vec<Result<Option<ArtifactReference>, RefreshError>>);

    impl ArtifactLocator for ScriptedLocator {
        fn locate_newest(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<ArtifactReference>, RefreshError>> + Send + '_>> {
            let next = self.0.remove(0);
            Box::pin(async move { next })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Panics on its first call, then lists a directory.
    struct PanicsOnce {
        panicked: bool,
        inner: LocalDirectoryLocator,
    }

    impl ArtifactLocator for PanicsOnce {
        fn locate_newest(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<ArtifactReference>, RefreshError>> + Send + '_>> {
            if !self.panicked {
                self.panicked = true;
                panic!("listing exploded");
            }
            self.inner.locate_newest()
        }

        fn name(&self) -> &'static str {
            "panics-once"
        }
    }

    async fn wait_for_snapshot(store: &SnapshotStore) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while store.read_current().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn image_dir(images: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in images {
            std::fs::write(dir.child(name), content).unwrap();
        }
        dir
    }

    fn scheduler(dir: &TempDir, analyzer: Arc<FakeAnalyzer>) -> (RefreshScheduler, Arc<SnapshotStore>) {
        let store = SnapshotStore::new();
        let locator = LocalDirectoryLocator::new(dir.path()).unwrap();
        (RefreshScheduler::new(Box::new(locator), analyzer, store.clone()), store)
    }

    #[tokio::test]
    async fn publishes_the_newest_image() {
        let dir = image_dir(&[("fsimage_1", "a"), ("fsimage_2", "bb"), ("fsimage_3", "ccc")]);
        let analyzer = Arc::new(FakeAnalyzer {
            broken: vec!["fsimage_1", "fsimage_2"],
            ..Default::default()
        });
        let (mut scheduler, store) = scheduler(&dir, analyzer);

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Published("fsimage_3".into()));
        let snapshot = store.read_current().unwrap();
        assert_eq!(snapshot.identity.as_str(), "fsimage_3");
        assert_eq!(snapshot.report.overall.files, 3);
        assert_eq!(snapshot.file_size_bytes, 3);
        assert_eq!(store.last_processed().unwrap().as_str(), "fsimage_3");
        assert_eq!(*scheduler.subscribe().borrow(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn idle_ticks_do_not_reanalyze() {
        let dir = image_dir(&[("fsimage_7", "x")]);
        let analyzer = Arc::new(FakeAnalyzer::default());
        let (mut scheduler, store) = scheduler(&dir, analyzer.clone());

        scheduler.run_cycle().await;
        for _ in 0..5 {
            assert_eq!(scheduler.run_cycle().await, CycleOutcome::Unchanged("fsimage_7".into()));
        }
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.completed_cycles(), 1);

        std::fs::write(dir.child("fsimage_8"), "xy").unwrap();
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Published("fsimage_8".into()));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_images_are_a_silent_no_op() {
        let dir = image_dir(&[]);
        let analyzer = Arc::new(FakeAnalyzer::default());
        let (mut scheduler, store) = scheduler(&dir, analyzer.clone());

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::NotFound);
        assert!(store.read_current().is_none());
        assert!(store.last_error().is_none());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_failed_analysis_is_retried_on_the_next_cycle() {
        let dir = image_dir(&[("fsimage_5", "abcde")]);
        let analyzer = Arc::new(FakeAnalyzer {
            fail_first: 1,
            ..Default::default()
        });
        let (mut scheduler, store) = scheduler(&dir, analyzer.clone());

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        assert!(store.read_current().is_none());
        assert!(store.last_processed().is_none());
        assert!(store.last_error().unwrap().contains("transient failure"));
        assert_eq!(*scheduler.subscribe().borrow(), RefreshPhase::Backoff);

        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Published("fsimage_5".into()));
        assert!(store.last_error().is_none());
        assert_eq!(store.failed_cycles(), 1);
        assert_eq!(store.completed_cycles(), 1);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_keep_the_previous_snapshot() {
        let store = SnapshotStore::new();
        let locator = ScriptedLocator(vec![
            Ok(Some(ArtifactReference::new("fsimage_1", "/nonexistent/fsimage_1", 1))),
            Err(RefreshError::FetchFailed(eyre::eyre!("connection refused"))),
        ]);
        let analyzer = Arc::new(FakeAnalyzer::default());
        let mut scheduler = RefreshScheduler::new(Box::new(locator), analyzer, store.clone());

        // The scripted path does not exist, so the first cycle fails inside the analyzer.
        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        store.publish(crate::store::snapshot("fsimage_0", 1));

        let outcome = scheduler.run_cycle().await;
        assert!(matches!(&outcome, CycleOutcome::Failed(msg) if msg.contains("connection refused")));
        assert_eq!(store.read_current().unwrap().identity.as_str(), "fsimage_0");
        assert_eq!(store.failed_cycles(), 2);
    }

    #[tokio::test]
    async fn analyzer_panics_are_contained() {
        let dir = image_dir(&[("fsimage_1", "a")]);
        let analyzer = Arc::new(FakeAnalyzer {
            panics: true,
            ..Default::default()
        });
        let (mut scheduler, store) = scheduler(&dir, analyzer);

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        assert_eq!(store.failed_cycles(), 2);
        assert!(store.read_current().is_none());
    }

    #[tokio::test]
    async fn spawned_loop_runs_immediately_and_stops_on_shutdown() {
        let dir = image_dir(&[("fsimage_11", "abc")]);
        let analyzer = Arc::new(FakeAnalyzer::default());
        let (scheduler, store) = scheduler(&dir, analyzer);

        let handle = scheduler.spawn(Duration::from_secs(3600)).unwrap();
        wait_for_snapshot(&store).await;
        assert_eq!(store.last_processed().unwrap().as_str(), "fsimage_11");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn spawned_loop_keeps_ticking_after_a_failed_cycle() {
        let dir = image_dir(&[("fsimage_4", "abcd")]);
        let analyzer = Arc::new(FakeAnalyzer {
            fail_first: 1,
            ..Default::default()
        });
        let (scheduler, store) = scheduler(&dir, analyzer.clone());

        let handle = scheduler.spawn(Duration::from_millis(10)).unwrap();
        wait_for_snapshot(&store).await;
        assert_eq!(store.read_current().unwrap().identity.as_str(), "fsimage_4");
        assert_eq!(store.failed_cycles(), 1);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn spawned_loop_survives_a_panicking_cycle() {
        let dir = image_dir(&[("fsimage_9", "x")]);
        let store = SnapshotStore::new();
        let locator = PanicsOnce {
            panicked: false,
            inner: LocalDirectoryLocator::new(dir.path()).unwrap(),
        };
        let scheduler = RefreshScheduler::new(Box::new(locator), Arc::new(FakeAnalyzer::default()), store.clone());

        let handle = scheduler.spawn(Duration::from_millis(10)).unwrap();
        wait_for_snapshot(&store).await;
        assert_eq!(store.read_current().unwrap().identity.as_str(), "fsimage_9");
        assert_eq!(store.failed_cycles(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn zero_periods_are_rejected() {
        let dir = image_dir(&[]);
        let (scheduler, _) = scheduler(&dir, Arc::new(FakeAnalyzer::default()));
        assert!(matches!(
            scheduler.spawn(Duration::ZERO),
            Err(RefreshError::InvalidConfiguration(_))
        ));
    }
}
