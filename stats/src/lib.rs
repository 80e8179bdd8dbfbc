#[macro_use]
extern crate tracing;

pub mod analyzer;
pub mod metrics;
pub mod report;
pub mod selection;

pub use analyzer::{
    DelimitedImageAnalyzer,
    ImageAnalyzer,
};
pub use metrics::{
    translate,
    TranslationError,
    METRIC_PREFIX,
};
pub use report::{
    FileSizeDistribution,
    FsImageReport,
    Stats,
};
pub use selection::{
    PathSelector,
    ReportOptions,
};
