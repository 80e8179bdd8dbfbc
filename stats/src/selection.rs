//! Path selections for the per-path and per-path-set statistics.

use eyre::{
    Context as _,
    Result,
};
use fsimage_exporter_config::Config;
use regex::Regex;

/// Marks a last segment as a pattern. `.` alone does not, so `db.db` stays literal.
const REGEX_META: &[char] = &['*', '+', '?', '[', ']', '(', ')', '{', '}', '|', '^', '$', '\\'];

/// A configured path. Either a literal directory, or a parent directory plus a pattern
/// matching the names of its direct children (`/user/ab.*`).
#[derive(Debug, Clone)]
pub enum PathSelector {
    Exact(String),
    Children { parent: String, pattern: Regex },
}

/// Where an inode sits relative to a selected directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected<'a> {
    /// The inode is the selected directory itself.
    Root(&'a str),
    /// The inode lives below the selected directory.
    Descendant(&'a str),
}

impl Selected<'_> {
    pub fn key(&self) -> &str {
        match self {
            Selected::Root(key) | Selected::Descendant(key) => key,
        }
    }
}

impl PathSelector {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = normalize(spec);
        let (parent, last) = match spec.rfind('/') {
            Some(0) => ("/", &spec[1..]),
            Some(idx) => (&spec[..idx], &spec[idx + 1..]),
            None => return Ok(Self::Exact(spec.to_string())),
        };

        if !last.contains(REGEX_META) {
            return Ok(Self::Exact(spec.to_string()));
        }

        let pattern = Regex::new(&format!("^(?:{last})$")).wrap_err_with(|| format!("Invalid path pattern {spec:?}"))?;
        Ok(Self::Children {
            parent: parent.to_string(),
            pattern,
        })
    }

    pub fn select<'a>(&'a self, path: &'a str) -> Option<Selected<'a>> {
        match self {
            Self::Exact(dir) => {
                if path == dir.as_str() {
                    return Some(Selected::Root(dir));
                }
                let rest = strip_dir(path, dir)?;
                (!rest.is_empty()).then_some(Selected::Descendant(dir))
            }
            Self::Children { parent, pattern } => {
                let rest = strip_dir(path, parent)?;
                let (child, below) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], true),
                    None => (rest, false),
                };
                if child.is_empty() || !pattern.is_match(child) {
                    return None;
                }
                let key_len = path.len() - rest.len() + child.len();
                let key = &path[..key_len];
                Some(if below {
                    Selected::Descendant(key)
                } else {
                    Selected::Root(key)
                })
            }
        }
    }
}

/// Returns the part of `path` below `dir`, without the separating slash.
fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir == "/" {
        return path.strip_prefix('/');
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim();
    match trimmed.trim_end_matches('/') {
        "" if trimmed.starts_with('/') => "/",
        stripped => stripped,
    }
}

/// Everything the aggregation needs to know besides the image itself.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub bucket_bounds: Vec<u64>,
    pub skip_user_distribution: bool,
    pub skip_group_distribution: bool,
    pub skip_path_distribution: bool,
    pub skip_path_set_distribution: bool,
    pub paths: Vec<PathSelector>,
    pub path_sets: Vec<(String, Vec<PathSelector>)>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            bucket_bounds: vec![0, 1 << 20, 32 << 20, 64 << 20, 128 << 20, 1 << 30, 10 << 30],
            skip_user_distribution: false,
            skip_group_distribution: false,
            skip_path_distribution: false,
            skip_path_set_distribution: false,
            paths: Vec::new(),
            path_sets: Vec::new(),
        }
    }
}

impl ReportOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let paths = config
            .paths
            .iter()
            .map(|path| PathSelector::parse(path))
            .collect::<Result<Vec<_>>>()?;

        let path_sets = config
            .path_sets
            .iter()
            .map(|(name, paths)| {
                let selectors = paths
                    .iter()
                    .map(|path| PathSelector::parse(path))
                    .collect::<Result<Vec<_>>>()
                    .wrap_err_with(|| format!("Invalid path set {name:?}"))?;
                Ok((name.clone(), selectors))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bucket_bounds: config.file_size_distribution_bounds()?,
            skip_user_distribution: config.skip_file_distribution_for_user_stats,
            skip_group_distribution: config.skip_file_distribution_for_group_stats,
            skip_path_distribution: config.skip_file_distribution_for_path_stats,
            skip_path_set_distribution: config.skip_file_distribution_for_path_set_stats,
            paths,
            path_sets,
        })
    }
}
