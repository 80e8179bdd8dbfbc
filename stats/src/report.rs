use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// Histogram of file sizes over fixed, inclusive upper bounds.
///
/// `counts` has one slot per bound plus a trailing overflow slot for sizes above the
/// largest bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSizeDistribution {
    bounds: Vec<u64>,
    counts: Vec<u64>,
    sum: u64,
}

impl FileSizeDistribution {
    pub fn new(bounds: &[u64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum: 0,
        }
    }

    pub fn observe(&mut self, size: u64) {
        let slot = self.bounds.partition_point(|bound| *bound < size);
        self.counts[slot] += 1;
        self.sum = self.sum.saturating_add(size);
    }

    pub fn bounds(&self) -> &[u64] {
        &self.bounds
    }

    /// Cumulative counts per bound, without the overflow slot.
    pub fn cumulative_counts(&self) -> Vec<u64> {
        self.counts[..self.bounds.len()]
            .iter()
            .scan(0u64, |acc, count| {
                *acc += count;
                Some(*acc)
            })
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }
}

/// Aggregated statistics for one slice of the namespace (everything, a user, a path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub dirs: u64,
    pub files: u64,
    pub links: u64,
    pub blocks: u64,
    pub total_file_size: u64,
    /// Sum of the replication factor of all files, used for the average.
    pub total_replication: u64,
    /// `None` when the distribution is skipped for this dimension.
    pub file_size_distribution: Option<FileSizeDistribution>,
}

impl Stats {
    pub fn new(bounds: Option<&[u64]>) -> Self {
        Self {
            file_size_distribution: bounds.map(FileSizeDistribution::new),
            ..Default::default()
        }
    }

    pub fn add_file(&mut self, size: u64, blocks: u64, replication: u32) {
        self.files += 1;
        self.blocks += blocks;
        self.total_file_size = self.total_file_size.saturating_add(size);
        self.total_replication += u64::from(replication);
        if let Some(distribution) = self.file_size_distribution.as_mut() {
            distribution.observe(size);
        }
    }

    pub fn add_dir(&mut self) {
        self.dirs += 1;
    }

    pub fn add_link(&mut self) {
        self.links += 1;
    }

    pub fn average_replication(&self) -> f64 {
        if self.files == 0 {
            return 0.0;
        }
        self.total_replication as f64 / self.files as f64
    }
}

/// Everything computed from one fsimage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FsImageReport {
    pub overall: Stats,
    pub users: BTreeMap<String, Stats>,
    pub groups: BTreeMap<String, Stats>,
    pub paths: BTreeMap<String, Stats>,
    pub path_sets: BTreeMap<String, Stats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MIB: u64 = 1 << 20;

    #[test]
    fn distribution_buckets_are_inclusive_upper_bounds() {
        let mut distribution = FileSizeDistribution::new(&[0, MIB, 32 * MIB]);
        for size in [0, 0, 1, MIB, MIB + 1, 64 * MIB] {
            distribution.observe(size);
        }
        assert_eq!(distribution.cumulative_counts(), vec![2, 4, 5]);
        assert_eq!(distribution.count(), 6);
        assert_eq!(distribution.sum(), 1 + MIB + MIB + 1 + 64 * MIB);
    }

    #[test]
    fn average_replication_ignores_dirs() {
        let mut stats = Stats::new(None);
        stats.add_dir();
        stats.add_file(10, 1, 3);
        stats.add_file(10, 1, 2);
        assert_eq!(stats.average_replication(), 2.5);
        assert!(stats.file_size_distribution.is_none());
        assert_eq!(Stats::new(None).average_replication(), 0.0);
    }
}
