use serde::{
    Deserialize,
    Serialize,
};
use std::{
    cmp::Ordering,
    path::PathBuf,
};

pub const IMAGE_PREFIX: &str = "fsimage_";

/// Name of one image version, e.g. `fsimage_0000000000000001234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ArtifactIdentity(String);

impl ArtifactIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transaction id encoded in the name, if it is a checkpoint name.
    pub fn txid(&self) -> Option<u64> {
        txid_of(&self.0)
    }
}

impl From<&str> for ArtifactIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// True for `fsimage_` followed by ASCII digits only. Checksums (`fsimage_1.md5`) and
/// in-progress checkpoints (`fsimage.ckpt_1`) do not match.
pub fn is_image_name(name: &str) -> bool {
    name.strip_prefix(IMAGE_PREFIX)
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn txid_of(name: &str) -> Option<u64> {
    txid_digits(name)?.parse().ok()
}

/// Transaction id digits without leading zeros, `""` for a zero id.
fn txid_digits(name: &str) -> Option<&str> {
    if !is_image_name(name) {
        return None;
    }
    Some(name[IMAGE_PREFIX.len()..].trim_start_matches('0'))
}

/// A locally readable image version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub identity: ArtifactIdentity,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ArtifactReference {
    pub fn new(identity: impl Into<ArtifactIdentity>, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
            size_bytes,
        }
    }

    /// Orders by transaction id first and by name when the ids are equal. Ids of any length
    /// compare numerically, and names without one sort before every checkpoint.
    pub fn version_cmp(&self, other: &Self) -> Ordering {
        fn key(identity: &ArtifactIdentity) -> Option<(usize, &str)> {
            txid_digits(identity.as_str()).map(|digits| (digits.len(), digits))
        }
        key(&self.identity)
            .cmp(&key(&other.identity))
            .then_with(|| self.identity.as_str().cmp(other.identity.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_names() {
        assert!(is_image_name("fsimage_0000000000000000042"));
        assert!(is_image_name("fsimage_1"));
        assert!(!is_image_name("fsimage_"));
        assert!(!is_image_name("fsimage_1.md5"));
        assert!(!is_image_name("fsimage.ckpt_1"));
        assert!(!is_image_name("edits_1-2"));
    }

    #[test]
    fn versions_compare_numerically() {
        let older = ArtifactReference::new("fsimage_99", "/x/fsimage_99", 0);
        let newer = ArtifactReference::new("fsimage_250", "/x/fsimage_250", 0);
        assert_eq!(newer.version_cmp(&older), Ordering::Greater);
        assert_eq!(ArtifactIdentity::from("fsimage_0000250").txid(), Some(250));
        assert_eq!(ArtifactIdentity::from("fsimage").txid(), None);
    }

    #[test]
    fn oversized_ids_still_compare_numerically() {
        let huge = ArtifactReference::new("fsimage_99999999999999999999", "/x/a", 0);
        let small = ArtifactReference::new("fsimage_5", "/x/b", 0);
        let padded = ArtifactReference::new("fsimage_00000000000000000000005", "/x/c", 0);
        let staging = ArtifactReference::new("fsimage", "/x/fsimage", 0);
        assert_eq!(huge.identity.txid(), None);
        assert_eq!(huge.version_cmp(&small), Ordering::Greater);
        assert_eq!(huge.version_cmp(&padded), Ordering::Greater);
        assert_eq!(small.version_cmp(&staging), Ordering::Greater);
        assert_eq!(padded.version_cmp(&small), Ordering::Less);
    }
}
