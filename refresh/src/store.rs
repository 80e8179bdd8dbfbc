use crate::{
    ArtifactIdentity,
    RefreshError,
    RefreshPhase,
};
use arc_swap::ArcSwapOption;
use chrono::{
    DateTime,
    Utc,
};
use fsimage_exporter_stats::FsImageReport;
use serde::Serialize;
use std::{
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

/// Result of one successful refresh cycle. Immutable once published.
#[derive(Debug, Clone)]
pub struct StatisticsSnapshot {
    pub identity: ArtifactIdentity,
    pub computed_at: DateTime<Utc>,
    pub load_duration: Duration,
    pub file_size_bytes: u64,
    pub report: FsImageReport,
}

/// Shared refresh state. The refresh task is the only writer, scrapes read without blocking.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwapOption<StatisticsSnapshot>,
    last_processed: ArcSwapOption<ArtifactIdentity>,
    last_error: ArcSwapOption<String>,
    completed_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    last_cycle_micros: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, snapshot: StatisticsSnapshot) -> Arc<StatisticsSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(snapshot.clone()));
        snapshot
    }

    pub fn read_current(&self) -> Option<Arc<StatisticsSnapshot>> {
        self.current.load_full()
    }

    pub fn last_processed(&self) -> Option<Arc<ArtifactIdentity>> {
        self.last_processed.load_full()
    }

    pub(crate) fn mark_processed(&self, identity: ArtifactIdentity) {
        self.last_processed.store(Some(Arc::new(identity)));
    }

    pub fn last_error(&self) -> Option<Arc<String>> {
        self.last_error.load_full()
    }

    pub(crate) fn record_success(&self, elapsed: Duration) {
        self.last_error.store(None);
        self.completed_cycles.fetch_add(1, Ordering::Relaxed);
        self.set_cycle_duration(elapsed);
    }

    pub(crate) fn record_failure(&self, err: &RefreshError, elapsed: Duration) {
        self.last_error.store(Some(Arc::new(err.to_string())));
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        self.set_cycle_duration(elapsed);
    }

    fn set_cycle_duration(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.last_cycle_micros.store(micros, Ordering::Relaxed);
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::Relaxed)
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::Relaxed)
    }

    pub fn last_cycle_duration(&self) -> Duration {
        Duration::from_micros(self.last_cycle_micros.load(Ordering::Relaxed))
    }

    pub fn status(&self, phase: RefreshPhase) -> RefreshStatus {
        let snapshot = self.read_current();
        RefreshStatus {
            phase,
            last_processed: self.last_processed().map(|id| id.as_ref().clone()),
            last_error: self.last_error().map(|err| err.as_ref().clone()),
            snapshot: snapshot.map(|snapshot| SnapshotStatus {
                identity: snapshot.identity.clone(),
                computed_at: snapshot.computed_at,
                load_duration_seconds: snapshot.load_duration.as_secs_f64(),
                file_size_bytes: snapshot.file_size_bytes,
            }),
            completed_cycles: self.completed_cycles(),
            failed_cycles: self.failed_cycles(),
            last_cycle_duration_seconds: self.last_cycle_duration().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub last_processed: Option<ArtifactIdentity>,
    pub last_error: Option<String>,
    pub snapshot: Option<SnapshotStatus>,
    pub completed_cycles: u64,
    pub failed_cycles: u64,
    pub last_cycle_duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub identity: ArtifactIdentity,
    pub computed_at: DateTime<Utc>,
    pub load_duration_seconds: f64,
    pub file_size_bytes: u64,
}

#[cfg(test)]
pub(crate) fn snapshot(identity: &str, files: u64) -> StatisticsSnapshot {
    let mut report = FsImageReport::default();
    report.overall.files = files;
    StatisticsSnapshot {
        identity: identity.into(),
        computed_at: Utc::now(),
        load_duration: Duration::from_millis(5),
        file_size_bytes: files * 10,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_until_the_first_publish() {
        let store = SnapshotStore::new();
        assert!(store.read_current().is_none());
        assert!(store.last_processed().is_none());

        store.publish(snapshot("fsimage_1", 1));
        assert_eq!(store.read_current().unwrap().identity.as_str(), "fsimage_1");
    }

    #[test]
    fn success_clears_the_last_error() {
        let store = SnapshotStore::new();
        store.record_failure(
            &RefreshError::ParseFailed(eyre::eyre!("bad row")),
            Duration::from_millis(3),
        );
        assert!(store.last_error().unwrap().contains("bad row"));
        assert_eq!(store.failed_cycles(), 1);

        store.record_success(Duration::from_millis(7));
        assert!(store.last_error().is_none());
        assert_eq!(store.completed_cycles(), 1);
        assert_eq!(store.last_cycle_duration(), Duration::from_millis(7));
    }

    #[test]
    fn readers_see_only_complete_snapshots() {
        // Every published snapshot keeps files == txid, a torn read would break that.
        let store = SnapshotStore::new();
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for txid in 1..=2000u64 {
                    store.publish(snapshot(&format!("fsimage_{txid}"), txid));
                }
            })
        };

        let readers = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut last_seen = 0;
                    for _ in 0..20_000 {
                        if let Some(snapshot) = store.read_current() {
                            let txid = snapshot.identity.txid().unwrap();
                            assert_eq!(snapshot.report.overall.files, txid);
                            assert_eq!(snapshot.file_size_bytes, txid * 10);
                            assert!(txid >= last_seen, "snapshots went backwards");
                            last_seen = txid;
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.read_current().unwrap().identity.as_str(), "fsimage_2000");
    }

    #[test]
    fn status_reports_the_snapshot() {
        let store = SnapshotStore::new();
        store.publish(snapshot("fsimage_4", 2));
        store.mark_processed("fsimage_4".into());
        let status = store.status(RefreshPhase::Idle);
        assert_eq!(status.last_processed, Some("fsimage_4".into()));
        assert_eq!(status.snapshot.unwrap().file_size_bytes, 20);

        let json = serde_json::to_value(store.status(RefreshPhase::Parsing)).unwrap();
        assert_eq!(json["phase"], "parsing");
        assert_eq!(json["last_processed"], "fsimage_4");
    }
}
