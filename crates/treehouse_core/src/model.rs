use std::fmt;

/// Account credentials used once, for the sign-in POST.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One stage of a course together with the step pages that carry a video.
///
/// Titles are not unique across a course; callers key stages by position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageSteps {
    pub title: String,
    pub step_urls: Vec<String>,
}

impl StageSteps {
    pub fn new(title: impl Into<String>, step_urls: Vec<String>) -> Self {
        Self {
            title: title.into(),
            step_urls,
        }
    }
}

/// Stages in the order the listing page presents them.
pub type StageListing = Vec<StageSteps>;

/// Counters collected over one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub stages: usize,
    pub steps: usize,
    pub downloaded: usize,
    pub already_downloaded: usize,
    pub without_video: usize,
    pub failed: usize,
    pub bytes_written: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stage(s), {} step(s): {} downloaded ({} bytes), {} already downloaded, {} without video, {} failed",
            self.stages,
            self.steps,
            self.downloaded,
            self.bytes_written,
            self.already_downloaded,
            self.without_video,
            self.failed
        )
    }
}
