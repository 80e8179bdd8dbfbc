use crate::{
    RefreshError,
    SnapshotStore,
    StatisticsSnapshot,
};
use fsimage_exporter_stats::{
    metrics::{
        gauge_metric,
        new_family,
    },
    translate,
    METRIC_PREFIX,
};
use prometheus::{
    core::{
        Collector,
        Desc,
    },
    proto::{
        MetricFamily,
        MetricType,
    },
    Gauge,
    IntCounter,
};
use std::{
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::Arc,
    time::Instant,
};

/// Serves the published snapshot to the registry. Never touches the filesystem or the network.
pub struct FsImageCollector {
    store: Arc<SnapshotStore>,
    scrape_duration: Gauge,
    scrape_requests: IntCounter,
    scrape_errors: IntCounter,
    descs: Vec<Desc>,
}

impl FsImageCollector {
    pub fn new(store: Arc<SnapshotStore>) -> prometheus::Result<Self> {
        let scrape_duration = Gauge::new(
            format!("{METRIC_PREFIX}scrape_duration_seconds"),
            "Duration of the last scrape in seconds",
        )?;
        let scrape_requests = IntCounter::new(
            format!("{METRIC_PREFIX}scrape_requests_total"),
            "Number of scrape requests",
        )?;
        let scrape_errors = IntCounter::new(
            format!("{METRIC_PREFIX}scrape_errors_total"),
            "Number of scrapes that could not serve statistics",
        )?;
        let descs = [
            scrape_duration.desc(),
            scrape_requests.desc(),
            scrape_errors.desc(),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();

        Ok(Self {
            store,
            scrape_duration,
            scrape_requests,
            scrape_errors,
            descs,
        })
    }

    fn data_families(snapshot: &StatisticsSnapshot) -> Result<Vec<MetricFamily>, RefreshError> {
        let computed_at = snapshot.computed_at.timestamp_millis() as f64 / 1000.0;
        let mut families = vec![
            single_gauge(
                "load_duration_seconds",
                "Time it took to analyze the fsimage",
                snapshot.load_duration.as_secs_f64(),
            ),
            single_gauge(
                "load_file_size_bytes",
                "Size of the analyzed fsimage in bytes",
                snapshot.file_size_bytes as f64,
            ),
            single_gauge(
                "compute_stats_timestamp_seconds",
                "Unix time the statistics were computed at",
                computed_at,
            ),
        ];
        families.extend(translate(&snapshot.report)?);
        Ok(families)
    }
}

fn single_gauge(name: &str, help: &str, value: f64) -> MetricFamily {
    let mut family = new_family(&format!("{METRIC_PREFIX}{name}"), help, MetricType::GAUGE);
    family.mut_metric().push(gauge_metric(&[], value));
    family
}

impl Collector for FsImageCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.scrape_requests.inc();
        let started = Instant::now();

        let mut families = match self.store.read_current() {
            None => {
                debug!("no fsimage statistics published yet");
                self.scrape_errors.inc();
                Vec::new()
            }
            Some(snapshot) => match panic::catch_unwind(AssertUnwindSafe(|| Self::data_families(&snapshot))) {
                Ok(Ok(families)) => families,
                Ok(Err(err)) => {
                    error!(identity = %snapshot.identity, "Failed to serve statistics: {err}");
                    self.scrape_errors.inc();
                    Vec::new()
                }
                Err(_) => {
                    error!(identity = %snapshot.identity, "Failed to serve statistics: translation panicked");
                    self.scrape_errors.inc();
                    Vec::new()
                }
            },
        };

        self.scrape_duration.set(started.elapsed().as_secs_f64());
        families.extend(self.scrape_duration.collect());
        families.extend(self.scrape_requests.collect());
        families.extend(self.scrape_errors.collect());
        families
    }
}
