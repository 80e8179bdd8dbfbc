//! Translates an [`FsImageReport`] into Prometheus metric families.

use crate::report::{
    FileSizeDistribution,
    FsImageReport,
    Stats,
};
use prometheus::proto::{
    self,
    MetricFamily,
    MetricType,
};
use std::collections::BTreeMap;

pub const METRIC_PREFIX: &str = "fsimage_";

#[derive(thiserror::Error, Debug)]
pub enum TranslationError {
    #[error("Histogram {name} has non ascending bucket bounds {bounds:?}")]
    UnorderedBuckets { name: String, bounds: Vec<u64> },
}

/// One breakdown of the report, e.g. per user.
struct Dimension<'a> {
    name: &'static str,
    label: &'static str,
    entries: &'a BTreeMap<String, Stats>,
}

pub fn translate(report: &FsImageReport) -> Result<Vec<MetricFamily>, TranslationError> {
    let mut families = Vec::new();

    let overall = [("", &report.overall)];
    push_stats(&mut families, "", None, overall.iter().map(|(k, v)| (*k, *v)), "")?;

    let dimensions = [
        Dimension {
            name: "user",
            label: "user_name",
            entries: &report.users,
        },
        Dimension {
            name: "group",
            label: "group_name",
            entries: &report.groups,
        },
        Dimension {
            name: "path",
            label: "path",
            entries: &report.paths,
        },
        Dimension {
            name: "path_set",
            label: "path_set",
            entries: &report.path_sets,
        },
    ];

    for dimension in dimensions {
        if dimension.entries.is_empty() {
            continue;
        }
        push_stats(
            &mut families,
            &format!("{}_", dimension.name),
            Some(dimension.label),
            dimension.entries.iter().map(|(k, v)| (k.as_str(), v)),
            &format!(" per {}", dimension.name.replace('_', " ")),
        )?;
    }

    Ok(families)
}

fn push_stats<'a>(
    families: &mut Vec<MetricFamily>,
    infix: &str,
    label: Option<&'static str>,
    entries: impl Iterator<Item = (&'a str, &'a Stats)> + Clone,
    help_suffix: &str,
) -> Result<(), TranslationError> {
    let name = |suffix: &str| format!("{METRIC_PREFIX}{infix}{suffix}");
    let labels = |value: &'a str| -> Vec<(&'static str, &'a str)> {
        label.map(|label| vec![(label, value)]).unwrap_or_default()
    };

    let gauges: [(&str, &str, fn(&Stats) -> f64); 5] = [
        ("dirs", "Number of directories", |s| s.dirs as f64),
        ("files", "Number of files", |s| s.files as f64),
        ("links", "Number of symbolic links", |s| s.links as f64),
        ("blocks", "Number of blocks", |s| s.blocks as f64),
        ("replication", "Average replication factor of files", |s| s.average_replication()),
    ];

    for (suffix, help, value) in gauges {
        let metric_name = name(suffix);
        let mut family = new_family(&metric_name, &format!("{help}{help_suffix}"), MetricType::GAUGE);
        for (key, stats) in entries.clone() {
            family.mut_metric().push(gauge_metric(&labels(key), value(stats)));
        }
        families.push(family);
    }

    let histogram_name = name("fsize");
    let mut histogram = new_family(
        &histogram_name,
        &format!("File size distribution{help_suffix}"),
        MetricType::HISTOGRAM,
    );
    let sum_name = name("fsize_bytes");
    let mut sum_gauge = new_family(
        &sum_name,
        &format!("Total size of all files in bytes{help_suffix}"),
        MetricType::GAUGE,
    );

    for (key, stats) in entries {
        let labels = labels(key);
        match &stats.file_size_distribution {
            Some(distribution) => {
                histogram
                    .mut_metric()
                    .push(histogram_metric(&histogram_name, &labels, distribution)?);
            }
            None => {
                sum_gauge
                    .mut_metric()
                    .push(gauge_metric(&labels, stats.total_file_size as f64));
            }
        }
    }

    for family in [histogram, sum_gauge] {
        if !family.get_metric().is_empty() {
            families.push(family);
        }
    }
    Ok(())
}

pub fn new_family(name: &str, help: &str, field_type: MetricType) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(name.to_string());
    family.set_help(help.to_string());
    family.set_field_type(field_type);
    family
}

pub fn gauge_metric(labels: &[(&str, &str)], value: f64) -> proto::Metric {
    let mut gauge = proto::Gauge::default();
    gauge.set_value(value);
    let mut metric = labeled_metric(labels);
    metric.set_gauge(gauge);
    metric
}

fn histogram_metric(
    name: &str,
    labels: &[(&str, &str)],
    distribution: &FileSizeDistribution,
) -> Result<proto::Metric, TranslationError> {
    let bounds = distribution.bounds();
    if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(TranslationError::UnorderedBuckets {
            name: name.to_string(),
            bounds: bounds.to_vec(),
        });
    }

    let mut histogram = proto::Histogram::default();
    histogram.set_sample_count(distribution.count());
    histogram.set_sample_sum(distribution.sum() as f64);
    for (bound, count) in bounds.iter().zip(distribution.cumulative_counts()) {
        let mut bucket = proto::Bucket::default();
        bucket.set_upper_bound(*bound as f64);
        bucket.set_cumulative_count(count);
        histogram.mut_bucket().push(bucket);
    }

    let mut metric = labeled_metric(labels);
    metric.set_histogram(histogram);
    Ok(metric)
}

fn labeled_metric(labels: &[(&str, &str)]) -> proto::Metric {
    let mut metric = proto::Metric::default();
    for (name, value) in labels {
        let mut pair = proto::LabelPair::default();
        pair.set_name(name.to_string());
        pair.set_value(value.to_string());
        metric.mut_label().push(pair);
    }
    metric
}
