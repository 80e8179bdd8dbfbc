use crate::{
    ArtifactReference,
    RefreshError,
};
use fsimage_exporter_config::Config;
use std::{
    future::Future,
    pin::Pin,
};

mod local;
mod remote;

pub use local::LocalDirectoryLocator;
pub use remote::{
    RemoteFetchLocator,
    STAGING_FILE,
};

/// Finds the newest image that is available on the local filesystem.
pub trait ArtifactLocator: Send {
    /// `Ok(None)` means there is no image yet.
    fn locate_newest(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<ArtifactReference>, RefreshError>> + Send + '_>>;

    fn name(&self) -> &'static str;
}

pub fn locator_from_config(config: &Config) -> Result<Box<dyn ArtifactLocator>, RefreshError> {
    if config.fetch_from_remote_namenode {
        Ok(Box::new(RemoteFetchLocator::new(
            config.namenode_urls.clone(),
            config.staging_dir(),
            config.fetch_timeout,
        )?))
    } else {
        Ok(Box::new(LocalDirectoryLocator::new(&config.fs_image_path)?))
    }
}
