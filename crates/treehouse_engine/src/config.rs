use std::path::PathBuf;
use std::time::Duration;

/// Pause after every attempted download.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(3);

/// Paths and markers of the course site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    /// Page carrying the sign-in form (and its CSRF token).
    pub signin_path: String,
    /// Endpoint the sign-in form posts to.
    pub session_path: String,
    pub email_field: String,
    pub password_field: String,
    /// Text only shown to signed-in users, matched case-insensitively.
    pub authenticated_marker: String,
    /// Appended to the course URL to reach the stage listing.
    pub stage_listing_suffix: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            signin_path: "/signin".to_string(),
            session_path: "/person_session".to_string(),
            email_field: "user_session[email]".to_string(),
            password_field: "user_session[password]".to_string(),
            authenticated_marker: "Sign Out".to_string(),
            stage_listing_suffix: "/stages".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Course landing page; also used to verify the login.
    pub course_url: String,
    /// Root for this course's stage folders.
    pub downloads_dir: PathBuf,
    pub ledger_path: PathBuf,
    /// Skip videos whose resolved URL is already in the ledger.
    pub skip_downloaded: bool,
    pub throttle: Duration,
    pub site: SiteSettings,
}

impl DownloaderConfig {
    pub fn new(
        course_url: impl Into<String>,
        downloads_dir: impl Into<PathBuf>,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            course_url: course_url.into(),
            downloads_dir: downloads_dir.into(),
            ledger_path: ledger_path.into(),
            skip_downloaded: false,
            throttle: DEFAULT_THROTTLE,
            site: SiteSettings::default(),
        }
    }
}
