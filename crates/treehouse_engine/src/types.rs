use std::fmt;
use std::path::PathBuf;

/// Position of a step within a run: 1-based stage ordinal and 1-based
/// per-stage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub stage: usize,
    pub step: usize,
}

impl StepRef {
    pub fn new(stage: usize, step: usize) -> Self {
        Self { stage, step }
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} step {}", self.stage, self.step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The step page could not be fetched.
    PageUnavailable(FailureKind),
    /// The step page has no HD video link (quiz, objective, ...).
    NoVideoLink,
    /// Skip mode is on and the resolved URL is already in the ledger.
    AlreadyDownloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    LoggedIn,
    StagesDiscovered {
        stages: usize,
        steps: usize,
    },
    StageStarted {
        ordinal: usize,
        title: String,
        steps: usize,
    },
    StepSkipped {
        step: StepRef,
        url: String,
        reason: SkipReason,
    },
    DownloadStarted {
        step: StepRef,
        url: String,
        path: PathBuf,
    },
    DownloadProgress {
        step: StepRef,
        bytes: u64,
    },
    DownloadCompleted {
        step: StepRef,
        path: PathBuf,
        bytes: u64,
    },
    DownloadFailed {
        step: StepRef,
        url: String,
        error: FetchError,
    },
}

/// A decoded HTML page and the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub final_url: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutput {
    pub final_url: String,
    pub bytes_written: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode,
    Io,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Decode => write!(f, "undecodable page"),
            FailureKind::Io => write!(f, "file write error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
