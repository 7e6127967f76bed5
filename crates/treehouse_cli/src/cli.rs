use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use treehouse_core::Credentials;
use treehouse_engine::DownloaderConfig;

use crate::logging::LogDestination;

/// Download the videos of a Treehouse course, one stage folder at a time.
///
/// Videos land in `<downloads-root>/<save_folder>/<n> - <stage>/video_<k>.mp4`.
#[derive(Debug, Parser)]
#[command(name = "treehouse-dl", version, about, long_about = None)]
pub struct Args {
    /// URL of the main course page
    pub course_url: String,

    /// Subfolder of the downloads root to save the course videos in
    pub save_folder: String,

    /// Your Treehouse account email
    pub email: String,

    /// Your Treehouse account password
    pub password: String,

    /// Skip videos already recorded in the download ledger (off by default)
    #[arg(short, long)]
    pub skip: bool,

    /// Base directory for all downloads
    #[arg(long, default_value = "downloads")]
    pub downloads_root: PathBuf,

    /// Ledger of completed downloads
    #[arg(long, default_value = ".treehouse_ledger.ron")]
    pub ledger: PathBuf,

    /// Seconds to pause after each attempted download
    #[arg(long, default_value_t = 3)]
    pub delay_secs: u64,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log_to: LogDestination,

    /// Log debug details
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_root.join(&self.save_folder)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        let mut config =
            DownloaderConfig::new(self.course_url.clone(), self.downloads_dir(), self.ledger.clone());
        config.skip_downloaded = self.skip;
        config.throttle = Duration::from_secs(self.delay_secs);
        config
    }
}
