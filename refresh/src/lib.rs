//! Background refresh of fsimage statistics.
//!
//! A single [`RefreshScheduler`] task locates the newest image, skips it when it was already
//! processed, analyzes it on the blocking pool and publishes the result into the
//! [`SnapshotStore`]. Scrapes go through [`FsImageCollector`], which only ever reads the last
//! published snapshot.

#[macro_use]
extern crate tracing;

mod artifact;
mod auth;
mod collector;
mod detector;
mod error;
pub mod locator;
mod scheduler;
mod store;

pub use artifact::{
    is_image_name,
    ArtifactIdentity,
    ArtifactReference,
};
pub use auth::KerberosCredentials;
pub use collector::FsImageCollector;
pub use detector::has_changed;
pub use error::RefreshError;
pub use locator::{
    locator_from_config,
    ArtifactLocator,
    LocalDirectoryLocator,
    RemoteFetchLocator,
};
pub use scheduler::{
    CycleOutcome,
    RefreshPhase,
    RefreshScheduler,
    SchedulerHandle,
};
pub use store::{
    RefreshStatus,
    SnapshotStatus,
    SnapshotStore,
    StatisticsSnapshot,
};
