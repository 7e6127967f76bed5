//! Treehouse engine: authenticated session, page parsing, download ledger
//! and the run orchestrator.
mod config;
mod decode;
mod downloader;
mod ledger;
mod parse;
mod persist;
mod session;
mod types;

pub use config::{DownloaderConfig, SiteSettings, DEFAULT_THROTTLE};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use downloader::{CourseDownloader, RunError, SetupError};
pub use ledger::{DownloadLedger, LedgerError};
pub use parse::{
    has_authenticated_marker, is_duration_label, parse_login_form, parse_stage_listing,
    parse_step_video_link,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError, StreamingFileWriter};
pub use session::{NullProgressSink, ProgressSink, ReqwestSession, SessionClient, SessionSettings};
pub use types::{
    DownloadEvent, DownloadOutput, FailureKind, FetchError, Page, SkipReason, StepRef,
};
