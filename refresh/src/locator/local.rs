use super::ArtifactLocator;
use crate::{
    artifact::is_image_name,
    ArtifactReference,
    RefreshError,
};
use std::{
    cmp::Ordering,
    future::Future,
    path::{
        Path,
        PathBuf,
    },
    pin::Pin,
};

/// Watches the `current/` directory a NameNode checkpoints into.
#[derive(Debug, Clone)]
pub struct LocalDirectoryLocator {
    dir: PathBuf,
}

impl LocalDirectoryLocator {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, RefreshError> {
        let dir = dir.as_ref();
        match std::fs::metadata(dir) {
            Ok(metadata) if metadata.is_dir() => Ok(Self { dir: dir.to_path_buf() }),
            Ok(_) => Err(RefreshError::invalid_configuration(format!(
                "fs_image_path {} is not a directory",
                dir.display()
            ))),
            Err(err) => Err(RefreshError::invalid_configuration(format!(
                "fs_image_path {} cannot be used: {err}",
                dir.display()
            ))),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn scan(&self) -> Result<Option<ArtifactReference>, RefreshError> {
        let listing_failed = |source| RefreshError::Listing {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(listing_failed)?;
        let mut newest: Option<ArtifactReference> = None;

        while let Some(entry) = entries.next_entry().await.map_err(listing_failed)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().filter(|name| is_image_name(name)) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(err) => {
                    // Checkpoints get rotated away while we list.
                    debug!(name, "skipping image that vanished during the scan: {err}");
                    continue;
                }
            };

            let candidate = ArtifactReference::new(name, entry.path(), metadata.len());
            match &newest {
                Some(current) if candidate.version_cmp(current) != Ordering::Greater => {}
                _ => newest = Some(candidate),
            }
        }

        Ok(newest)
    }
}

impl ArtifactLocator for LocalDirectoryLocator {
    fn locate_newest(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<ArtifactReference>, RefreshError>> + Send + '_>> {
        Box::pin(self.scan())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
