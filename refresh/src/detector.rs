use crate::{
    ArtifactIdentity,
    ArtifactReference,
};

/// Whether `candidate` is a version that has not been processed yet. Compares identities only,
/// never content or timestamps.
pub fn has_changed(previous: Option<&ArtifactIdentity>, candidate: &ArtifactReference) -> bool {
    previous != Some(&candidate.identity)
}
