use std::path::Path;
use std::time::Duration;

use engine_logging::engine_debug;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::decode::decode_page;
use crate::persist::StreamingFileWriter;
use crate::{DownloadEvent, DownloadOutput, FailureKind, FetchError, Page, StepRef};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Applies per read, so long video streams are not cut off.
    pub read_timeout: Duration,
    pub redirect_limit: usize,
    /// Cap for HTML pages; video downloads are not capped.
    pub max_page_bytes: u64,
    pub allowed_page_content_types: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            redirect_limit: 10,
            max_page_bytes: 5 * 1024 * 1024,
            allowed_page_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: DownloadEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: DownloadEvent) {}
}

/// An authenticated browsing session. Cookies set by one call are sent on
/// every later call.
#[async_trait::async_trait]
pub trait SessionClient: Send + Sync {
    /// GET an HTML page and decode it.
    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError>;

    /// POST url-encoded form fields and return the page the server lands on.
    async fn submit_form(&self, url: &str, fields: &[(String, String)])
        -> Result<Page, FetchError>;

    /// Follow redirects from `url` and return the final URL.
    async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError>;

    /// GET `url` and stream the body into `dest`.
    async fn download(
        &self,
        step: StepRef,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutput, FetchError>;
}

/// Session backed by one reqwest client with a cookie store.
#[derive(Debug, Clone)]
pub struct ReqwestSession {
    client: reqwest::Client,
    settings: SessionSettings,
}

impl ReqwestSession {
    pub fn new(settings: SessionSettings) -> Result<Self, FetchError> {
        // robots.txt is not consulted.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_page_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn read_page(
        &self,
        response: reqwest::Response,
        check_content_type: bool,
    ) -> Result<Page, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("{status} from {}", response.url()),
            ));
        }

        let max_bytes = self.settings.max_page_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "page too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = header_content_type(&response);

        if let Some(ct) = content_type.as_deref().filter(|_| check_content_type) {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    format!("{final_url} is not an HTML page"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "page too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_page(&bytes, content_type.as_deref())
            .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))?;
        engine_debug!(
            "Fetched {} ({} bytes, {})",
            final_url,
            bytes.len(),
            decoded.encoding_label
        );

        Ok(Page {
            final_url,
            html: decoded.html,
        })
    }
}

#[async_trait::async_trait]
impl SessionClient for ReqwestSession {
    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read_page(response, true).await
    }

    async fn submit_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<Page, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .post(parsed)
            .form(fields)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read_page(response, false).await
    }

    async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError> {
        let parsed = parse_url(url)?;
        // The final hop may refuse HEAD; its URL is still the resolved one.
        let response = self
            .client
            .head(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(response.url().to_string())
    }

    async fn download(
        &self,
        step: StepRef,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutput, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("{status} from {}", response.url()),
            ));
        }

        let final_url = response.url().to_string();
        let mut writer = StreamingFileWriter::create(dest).map_err(map_persist_error)?;
        sink.emit(DownloadEvent::DownloadProgress { step, bytes: 0 });

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let bytes = writer.write_chunk(&chunk).map_err(map_persist_error)?;
            sink.emit(DownloadEvent::DownloadProgress { step, bytes });
        }

        let path = writer.path().to_path_buf();
        let bytes_written = writer.finish().map_err(map_persist_error)?;
        Ok(DownloadOutput {
            final_url,
            bytes_written,
            path,
        })
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
    reqwest::Url::parse(url)
        .map_err(|err| FetchError::new(FailureKind::InvalidUrl, format!("{url}: {err}")))
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

fn map_persist_error(err: crate::PersistError) -> FetchError {
    FetchError::new(FailureKind::Io, err.to_string())
}
