use std::path::Path;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use thiserror::Error;
use treehouse_core::{
    origin_of, resolve_link, stage_dir_name, stage_listing_url, video_filename, Credentials,
    RunSummary, StageListing, StageSteps,
};

use crate::config::DownloaderConfig;
use crate::ledger::{DownloadLedger, LedgerError};
use crate::parse::{
    has_authenticated_marker, parse_login_form, parse_stage_listing, parse_step_video_link,
};
use crate::persist::{ensure_output_dir, PersistError};
use crate::session::{ProgressSink, SessionClient};
use crate::{DownloadEvent, FetchError, SkipReason, StepRef};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("course url {0:?} has no http(s) origin")]
    InvalidCourseUrl(String),
    #[error("cannot open download ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("cannot create download directory: {0}")]
    DownloadDir(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("login failed: check your email and password")]
    AuthenticationFailed,
}

/// Drives one run: setup, login, stage discovery and the per-stage
/// download loop. Owns the session for the whole run.
pub struct CourseDownloader {
    config: DownloaderConfig,
    origin: String,
    credentials: Credentials,
    session: Box<dyn SessionClient>,
    sink: Arc<dyn ProgressSink>,
}

impl CourseDownloader {
    /// Fails when the course URL has no http(s) origin to sign in against.
    pub fn new(
        config: DownloaderConfig,
        credentials: Credentials,
        session: Box<dyn SessionClient>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, SetupError> {
        let origin = origin_of(&config.course_url)
            .filter(|origin| origin.starts_with("http"))
            .ok_or_else(|| SetupError::InvalidCourseUrl(config.course_url.clone()))?;
        Ok(Self {
            config,
            origin,
            credentials,
            session,
            sink,
        })
    }

    /// Download every video of the course that is not skipped.
    ///
    /// Only setup and login failures end the run early; everything after
    /// that is logged, reported to the sink and counted in the summary.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let mut ledger = self.setup()?;

        if !self.login().await {
            engine_error!("Login failed for {}", self.credentials.email);
            return Err(RunError::AuthenticationFailed);
        }

        let stages = self.discover().await;
        let mut summary = RunSummary {
            stages: stages.len(),
            steps: stages.iter().map(|stage| stage.step_urls.len()).sum(),
            ..RunSummary::default()
        };

        for (index, stage) in stages.iter().enumerate() {
            self.download_stage(index + 1, stage, &mut ledger, &mut summary)
                .await;
        }

        engine_info!("Run finished: {}", summary);
        Ok(summary)
    }

    /// Sign in and confirm the session by looking for the signed-in marker on
    /// the course page.
    pub async fn login(&self) -> bool {
        let site = &self.config.site;
        let origin = &self.origin;
        let signin_url = format!("{origin}{}", site.signin_path);
        let mut fields = match self.session.fetch_page(&signin_url).await {
            Ok(page) => parse_login_form(&page.html),
            Err(err) => {
                engine_warn!("Could not load sign-in page {}: {}", signin_url, err);
                Vec::new()
            }
        };
        fields.retain(|(name, _)| name != &site.email_field && name != &site.password_field);
        fields.push((site.email_field.clone(), self.credentials.email.clone()));
        fields.push((site.password_field.clone(), self.credentials.password.clone()));

        let session_url = format!("{origin}{}", site.session_path);
        if let Err(err) = self.session.submit_form(&session_url, &fields).await {
            engine_error!("Sign-in request to {} failed: {}", session_url, err);
            return false;
        }

        match self.session.fetch_page(&self.config.course_url).await {
            Ok(page) if has_authenticated_marker(&page.html, &site.authenticated_marker) => {
                engine_info!("Logged in as {}", self.credentials.email);
                engine_debug!("Course page served from {}", page.final_url);
                self.sink.emit(DownloadEvent::LoggedIn);
                true
            }
            Ok(page) => {
                engine_warn!(
                    "Course page {} does not show {:?}; credentials were not accepted",
                    page.final_url,
                    site.authenticated_marker
                );
                false
            }
            Err(err) => {
                engine_error!("Could not reload {}: {}", self.config.course_url, err);
                false
            }
        }
    }

    /// Fetch the stage listing once. A failed fetch yields no stages.
    pub async fn discover(&self) -> StageListing {
        let url = stage_listing_url(&self.config.course_url, &self.config.site.stage_listing_suffix);
        let stages = match self.session.fetch_page(&url).await {
            Ok(page) => parse_stage_listing(&page.html),
            Err(err) => {
                engine_error!("Could not fetch stage listing {}: {}", url, err);
                Vec::new()
            }
        };
        let steps = stages.iter().map(|stage| stage.step_urls.len()).sum();
        engine_info!("Found {} stage(s) with {} video step(s)", stages.len(), steps);
        self.sink.emit(DownloadEvent::StagesDiscovered {
            stages: stages.len(),
            steps,
        });
        stages
    }

    /// Absolute HD video link of a step page, if it has one.
    pub async fn video_url(&self, step_url: &str) -> Result<Option<String>, FetchError> {
        let page_url =
            resolve_link(&self.origin, step_url).unwrap_or_else(|| step_url.to_string());
        let page = self.session.fetch_page(&page_url).await?;
        Ok(parse_step_video_link(&page.html).and_then(|link| resolve_link(&self.origin, &link)))
    }

    fn setup(&self) -> Result<DownloadLedger, SetupError> {
        let ledger = DownloadLedger::open(&self.config.ledger_path)?;
        ensure_output_dir(&self.config.downloads_dir)?;
        Ok(ledger)
    }

    async fn download_stage(
        &self,
        ordinal: usize,
        stage: &StageSteps,
        ledger: &mut DownloadLedger,
        summary: &mut RunSummary,
    ) {
        self.sink.emit(DownloadEvent::StageStarted {
            ordinal,
            title: stage.title.clone(),
            steps: stage.step_urls.len(),
        });
        let stage_dir = self.config.downloads_dir.join(stage_dir_name(ordinal, &stage.title));
        if let Err(err) = ensure_output_dir(&stage_dir) {
            engine_error!("Skipping stage {}: {}", ordinal, err);
            summary.failed += stage.step_urls.len();
            return;
        }
        if stage.step_urls.is_empty() {
            engine_debug!("Stage {} ({}) has no videos", ordinal, stage.title);
            return;
        }
        engine_info!("Stage {}: {} ({} videos)", ordinal, stage.title, stage.step_urls.len());

        for (index, step_url) in stage.step_urls.iter().enumerate() {
            let step = StepRef::new(ordinal, index + 1);
            self.download_step(step, step_url, &stage_dir, ledger, summary)
                .await;
        }
    }

    async fn download_step(
        &self,
        step: StepRef,
        step_url: &str,
        stage_dir: &Path,
        ledger: &mut DownloadLedger,
        summary: &mut RunSummary,
    ) {
        let link = match self.video_url(step_url).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                engine_info!("{}: no HD video on {}", step, step_url);
                summary.without_video += 1;
                self.skip(step, step_url, SkipReason::NoVideoLink);
                return;
            }
            Err(err) => {
                engine_warn!("{}: could not load {}: {}", step, step_url, err);
                summary.failed += 1;
                self.skip(step, step_url, SkipReason::PageUnavailable(err.kind));
                return;
            }
        };

        // Skip check, download and ledger entry all use the redirect target.
        let resolved = match self.session.resolve_final_url(&link).await {
            Ok(url) => url,
            Err(err) => {
                self.record_failure(step, &link, err, summary);
                self.throttle().await;
                return;
            }
        };

        if self.config.skip_downloaded && ledger.contains(&resolved) {
            engine_info!("{}: already downloaded, skipping", step);
            summary.already_downloaded += 1;
            self.skip(step, &resolved, SkipReason::AlreadyDownloaded);
            return;
        }

        let dest = stage_dir.join(video_filename(step.step));
        engine_info!("{}: downloading {} -> {}", step, resolved, dest.display());
        self.sink.emit(DownloadEvent::DownloadStarted {
            step,
            url: resolved.clone(),
            path: dest.clone(),
        });

        match self
            .session
            .download(step, &resolved, &dest, self.sink.as_ref())
            .await
        {
            Ok(output) => {
                engine_debug!("{}: served by {}", step, output.final_url);
                if let Err(err) = ledger.insert(&resolved) {
                    engine_error!(
                        "{}: downloaded but not recorded in {}: {}",
                        step,
                        ledger.path().display(),
                        err
                    );
                }
                summary.downloaded += 1;
                summary.bytes_written += output.bytes_written;
                self.sink.emit(DownloadEvent::DownloadCompleted {
                    step,
                    path: output.path,
                    bytes: output.bytes_written,
                });
            }
            Err(err) => self.record_failure(step, &resolved, err, summary),
        }

        self.throttle().await;
    }

    fn skip(&self, step: StepRef, url: &str, reason: SkipReason) {
        self.sink.emit(DownloadEvent::StepSkipped {
            step,
            url: url.to_string(),
            reason,
        });
    }

    fn record_failure(&self, step: StepRef, url: &str, error: FetchError, summary: &mut RunSummary) {
        engine_warn!("{}: download of {} failed: {}", step, url, error);
        summary.failed += 1;
        self.sink.emit(DownloadEvent::DownloadFailed {
            step,
            url: url.to_string(),
            error,
        });
    }

    async fn throttle(&self) {
        if !self.config.throttle.is_zero() {
            tokio::time::sleep(self.config.throttle).await;
        }
    }
}
