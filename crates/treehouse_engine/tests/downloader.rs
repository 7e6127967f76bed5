use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use treehouse_core::{Credentials, RunSummary};
use treehouse_engine::{
    CourseDownloader, DownloadEvent, DownloadLedger, DownloaderConfig, FailureKind,
    ProgressSink, ReqwestSession, RunError, SessionSettings, SetupError, SkipReason, StepRef,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIGNIN_PAGE: &str = r#"
<html><body>
  <form action="/person_session" method="post">
    <input type="hidden" name="authenticity_token" value="csrf-token">
    <input type="email" name="user_session[email]">
    <input type="password" name="user_session[password]">
  </form>
</body></html>
"#;

const STAGE_LISTING: &str = r#"
<html><body>
  <div class="featurette">
    <h2>Stage One</h2>
    <ul>
      <li><a href="/library/course/s1"><strong>Intro</strong><p>3:45</p></a></li>
      <li><a href="/library/course/quiz"><strong>Quiz</strong><p>5 questions</p></a></li>
      <li><a href="/library/course/s2"><strong>Setup</strong><p>12:07</p></a></li>
    </ul>
  </div>
  <div class="featurette">
    <h2>Stage Two</h2>
    <ul>
      <li><a href="/library/course/s3"><strong>Wrap up</strong><p>0:59</p></a></li>
    </ul>
  </div>
</body></html>
"#;

#[derive(Default, Clone)]
struct RecordingSink {
    events: Arc<Mutex<Vec<DownloadEvent>>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<DownloadEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: DownloadEvent) {
        if !matches!(event, DownloadEvent::DownloadProgress { .. }) {
            self.events.lock().unwrap().push(event);
        }
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

async fn mount_login(server: &MockServer, accept: bool) {
    Mock::given(method("GET"))
        .and(path("/signin"))
        .respond_with(html(SIGNIN_PAGE))
        .mount(server)
        .await;

    let mut session_response = html("<p>signed in</p>");
    if accept {
        session_response = session_response.insert_header("Set-Cookie", "session=abc; Path=/");
    }
    Mock::given(method("POST"))
        .and(path("/person_session"))
        .and(body_string_contains("authenticity_token=csrf-token"))
        .and(body_string_contains("user_session%5Bemail%5D=me%40example.com"))
        .and(body_string_contains("user_session%5Bpassword%5D=secret"))
        .respond_with(session_response)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/library/course"))
        .and(header("cookie", "session=abc"))
        .respond_with(html(r#"<a href="/logout">Sign Out</a>"#))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/library/course"))
        .respond_with(html(r#"<a href="/signin">Sign In</a>"#))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, listing: &str) {
    Mock::given(method("GET"))
        .and(path("/library/course/stages"))
        .respond_with(html(listing))
        .mount(server)
        .await;
}

async fn mount_video_step(server: &MockServer, step: &str, video: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/library/course/{step}")))
        .respond_with(html(&format!(
            r#"<a href="/videos/{video}">SD</a><a href="/videos/{video}?hd=yes">HD</a>"#
        )))
        .mount(server)
        .await;
    Mock::given(path(format!("/videos/{video}")))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("/cdn/{video}.mp4")),
        )
        .mount(server)
        .await;
    Mock::given(path(format!("/cdn/{video}.mp4")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "video/mp4"))
        .mount(server)
        .await;
}

async fn mount_course(server: &MockServer) {
    mount_login(server, true).await;
    mount_listing(server, STAGE_LISTING).await;
    mount_video_step(server, "s1", "1", "one").await;
    mount_video_step(server, "s2", "2", "two!").await;
    mount_video_step(server, "s3", "3", "three").await;
}

struct Workspace {
    _temp: TempDir,
    downloads: PathBuf,
    ledger: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads").join("course");
        let ledger = temp.path().join("ledger.ron");
        Self {
            _temp: temp,
            downloads,
            ledger,
        }
    }

    fn config(&self, server: &MockServer, skip: bool) -> DownloaderConfig {
        let mut config = DownloaderConfig::new(
            format!("{}/library/course", server.uri()),
            &self.downloads,
            &self.ledger,
        );
        config.skip_downloaded = skip;
        config.throttle = Duration::ZERO;
        config
    }

    fn downloader(&self, server: &MockServer, skip: bool, sink: &RecordingSink) -> CourseDownloader {
        let session = ReqwestSession::new(SessionSettings::default()).unwrap();
        CourseDownloader::new(
            self.config(server, skip),
            Credentials::new("me@example.com", "secret"),
            Box::new(session),
            Arc::new(sink.clone()),
        )
        .expect("valid course url")
    }

    fn video(&self, stage_dir: &str, name: &str) -> PathBuf {
        self.downloads.join(stage_dir).join(name)
    }
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn cdn_downloads(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "GET" && request.url.path().starts_with("/cdn/"))
        .count()
}

#[tokio::test]
async fn full_run_downloads_videos_into_stage_folders() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_course(&server).await;
    let ws = Workspace::new();
    let sink = RecordingSink::default();

    let summary = ws.downloader(&server, false, &sink).run().await.expect("run ok");

    assert_eq!(
        summary,
        RunSummary {
            stages: 2,
            steps: 3,
            downloaded: 3,
            already_downloaded: 0,
            without_video: 0,
            failed: 0,
            bytes_written: 12,
        }
    );
    assert_eq!(dir_entries(&ws.downloads), vec!["1 - Stage One", "2 - Stage Two"]);
    assert_eq!(
        dir_entries(&ws.downloads.join("1 - Stage One")),
        vec!["video_1.mp4", "video_2.mp4"]
    );
    assert_eq!(fs::read(ws.video("1 - Stage One", "video_1.mp4")).unwrap(), b"one");
    assert_eq!(fs::read(ws.video("1 - Stage One", "video_2.mp4")).unwrap(), b"two!");
    assert_eq!(fs::read(ws.video("2 - Stage Two", "video_1.mp4")).unwrap(), b"three");

    let ledger = DownloadLedger::open(&ws.ledger).unwrap();
    assert_eq!(ledger.len(), 3);
    for video in ["1", "2", "3"] {
        assert!(ledger.contains(&format!("{}/cdn/{video}.mp4", server.uri())));
    }

    let events = sink.events();
    assert_eq!(events.first(), Some(&DownloadEvent::LoggedIn));
    assert!(events.contains(&DownloadEvent::StagesDiscovered { stages: 2, steps: 3 }));
}

#[tokio::test]
async fn rejected_login_aborts_before_discovery() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_login(&server, false).await;
    mount_listing(&server, STAGE_LISTING).await;
    let ws = Workspace::new();
    let sink = RecordingSink::default();

    let downloader = ws.downloader(&server, true, &sink);
    assert!(!downloader.login().await);

    let err = downloader.run().await.unwrap_err();
    assert!(matches!(err, RunError::AuthenticationFailed));
    assert!(ws.ledger.is_file());
    assert!(dir_entries(&ws.downloads).is_empty());
    assert!(sink.events().is_empty());

    let listing_fetches = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == "/library/course/stages")
        .count();
    assert_eq!(listing_fetches, 0);
}

#[tokio::test]
async fn failing_step_page_is_skipped_and_counter_advances() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_login(&server, true).await;
    mount_listing(
        &server,
        r#"<div class="featurette"><h2>Only</h2><ul>
            <li><a href="/library/course/s1"><p>1:00</p></a></li>
            <li><a href="/library/course/broken"><p>2:00</p></a></li>
            <li><a href="/library/course/s3"><p>3:00</p></a></li>
        </ul></div>"#,
    )
    .await;
    mount_video_step(&server, "s1", "1", "one").await;
    Mock::given(method("GET"))
        .and(path("/library/course/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_video_step(&server, "s3", "3", "three").await;
    let ws = Workspace::new();
    let sink = RecordingSink::default();

    let summary = ws.downloader(&server, false, &sink).run().await.unwrap();

    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        dir_entries(&ws.downloads.join("1 - Only")),
        vec!["video_1.mp4", "video_3.mp4"]
    );
    assert!(sink.events().contains(&DownloadEvent::StepSkipped {
        step: StepRef::new(1, 2),
        url: "/library/course/broken".to_string(),
        reason: SkipReason::PageUnavailable(FailureKind::HttpStatus(500)),
    }));
}

#[tokio::test]
async fn step_without_hd_link_is_skipped() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_login(&server, true).await;
    mount_listing(
        &server,
        r#"<div class="featurette"><h2>Only</h2><ul>
            <li><a href="/library/course/plain"><p>1:00</p></a></li>
            <li><a href="/library/course/s2"><p>2:00</p></a></li>
        </ul></div>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/library/course/plain"))
        .respond_with(html(r#"<a href="/videos/9">SD only</a>"#))
        .mount(&server)
        .await;
    mount_video_step(&server, "s2", "2", "two").await;
    let ws = Workspace::new();

    let summary = ws
        .downloader(&server, false, &RecordingSink::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.without_video, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(dir_entries(&ws.downloads.join("1 - Only")), vec!["video_2.mp4"]);
}

#[tokio::test]
async fn second_run_with_skip_downloads_nothing() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_course(&server).await;
    let ws = Workspace::new();

    let first = ws
        .downloader(&server, true, &RecordingSink::default())
        .run()
        .await
        .unwrap();
    assert_eq!(first.downloaded, 3);
    assert_eq!(cdn_downloads(&server).await, 3);

    fs::remove_file(ws.video("1 - Stage One", "video_1.mp4")).unwrap();
    let sink = RecordingSink::default();
    let second = ws.downloader(&server, true, &sink).run().await.unwrap();

    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_downloaded, 3);
    assert_eq!(cdn_downloads(&server).await, 3);
    assert!(!ws.video("1 - Stage One", "video_1.mp4").exists());
    assert_eq!(DownloadLedger::open(&ws.ledger).unwrap().len(), 3);
    assert!(sink.events().contains(&DownloadEvent::StepSkipped {
        step: StepRef::new(2, 1),
        url: format!("{}/cdn/3.mp4", server.uri()),
        reason: SkipReason::AlreadyDownloaded,
    }));
}

#[tokio::test]
async fn failed_video_is_not_recorded_and_is_retried_next_run() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_course(&server).await;
    Mock::given(method("GET"))
        .and(path("/cdn/1.mp4"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    let ws = Workspace::new();
    let failed_url = format!("{}/cdn/1.mp4", server.uri());
    let sink = RecordingSink::default();

    let first = ws.downloader(&server, true, &sink).run().await.unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!(first.downloaded, 2);
    assert!(!ws.video("1 - Stage One", "video_1.mp4").exists());
    assert_eq!(fs::read(ws.video("1 - Stage One", "video_2.mp4")).unwrap(), b"two!");
    let ledger = DownloadLedger::open(&ws.ledger).unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(!ledger.contains(&failed_url));
    assert!(sink.events().iter().any(|event| matches!(
        event,
        DownloadEvent::DownloadFailed { step, url, error }
            if *step == StepRef::new(1, 1)
                && *url == failed_url
                && error.kind == FailureKind::HttpStatus(500)
    )));

    let second = ws
        .downloader(&server, true, &RecordingSink::default())
        .run()
        .await
        .unwrap();

    assert_eq!(second.downloaded, 1);
    assert_eq!(second.already_downloaded, 2);
    assert_eq!(second.failed, 0);
    assert_eq!(fs::read(ws.video("1 - Stage One", "video_1.mp4")).unwrap(), b"one");
    let ledger = DownloadLedger::open(&ws.ledger).unwrap();
    assert_eq!(ledger.len(), 3);
    assert!(ledger.contains(&failed_url));
}

#[tokio::test]
async fn without_skip_mode_videos_are_downloaded_again() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_course(&server).await;
    let ws = Workspace::new();

    ws.downloader(&server, false, &RecordingSink::default())
        .run()
        .await
        .unwrap();
    let second = ws
        .downloader(&server, false, &RecordingSink::default())
        .run()
        .await
        .unwrap();

    assert_eq!(second.downloaded, 3);
    assert_eq!(cdn_downloads(&server).await, 6);
}

#[tokio::test]
async fn empty_listing_is_not_an_error() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_login(&server, true).await;
    mount_listing(&server, "<html><body><p>Coming soon</p></body></html>").await;
    let ws = Workspace::new();

    let summary = ws
        .downloader(&server, true, &RecordingSink::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert!(dir_entries(&ws.downloads).is_empty());
}

#[tokio::test]
async fn unreadable_ledger_aborts_before_network() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_course(&server).await;
    let ws = Workspace::new();
    fs::write(&ws.ledger, "not a ledger").unwrap();

    let err = ws
        .downloader(&server, true, &RecordingSink::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Setup(SetupError::Ledger(_))));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(!ws.downloads.exists());
}

#[test]
fn course_url_without_origin_is_rejected() {
    let ws = Workspace::new();
    let config = DownloaderConfig::new("library/course", &ws.downloads, &ws.ledger);
    let result = CourseDownloader::new(
        config,
        Credentials::new("me@example.com", "secret"),
        Box::new(ReqwestSession::new(SessionSettings::default()).unwrap()),
        Arc::new(RecordingSink::default()),
    );
    assert!(matches!(result, Err(SetupError::InvalidCourseUrl(_))));
}
