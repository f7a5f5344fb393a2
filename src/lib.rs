pub mod config;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod ledger;
pub mod models;
pub mod ranker;
pub mod resolver;
pub mod service;
pub mod ytdlp;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::DownloadCoordinator;
    pub use crate::error::AppError;
    pub use crate::files::{FileDownload, FileManager};
    pub use crate::ledger::Ledger;
    pub use crate::models::{
        DownloadRecord, DownloadRequest, DownloadStatus, FormatDescriptor, RankedFormat, VideoInfo,
    };
    pub use crate::resolver::{FetchOutcome, FetchRequest, MediaResolver, ProbeResult};
    pub use crate::service::MediaService;
    pub use crate::ytdlp::YtDlpResolver;
}
