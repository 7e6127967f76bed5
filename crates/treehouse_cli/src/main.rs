mod cli;
mod logging;
mod progress;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine_logging::{engine_error, engine_info};
use treehouse_core::RunSummary;
use treehouse_engine::{CourseDownloader, ReqwestSession, SessionSettings};

use crate::cli::Args;
use crate::progress::LogProgressSink;

const FAREWELL: &str = "Bye. See you soon :)";

fn main() -> ExitCode {
    let args = Args::parse();
    logging::initialize(args.log_to, args.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            engine_error!("Could not start the async runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        tokio::select! {
            result = download_course(&args) => match result {
                Ok(summary) => {
                    println!("{summary}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    engine_error!("{:#}", err);
                    ExitCode::FAILURE
                }
            },
            Ok(()) = tokio::signal::ctrl_c() => {
                println!("\n{FAREWELL}");
                ExitCode::SUCCESS
            }
        }
    })
}

async fn download_course(args: &Args) -> anyhow::Result<RunSummary> {
    let session =
        ReqwestSession::new(SessionSettings::default()).context("could not build HTTP client")?;
    let config = args.downloader_config();
    engine_info!(
        "Downloading {} into {} (skip downloaded: {})",
        config.course_url,
        config.downloads_dir.display(),
        config.skip_downloaded
    );

    let downloader = CourseDownloader::new(
        config,
        args.credentials(),
        Box::new(session),
        Arc::new(LogProgressSink::default()),
    )?;
    let summary = downloader.run().await?;
    Ok(summary)
}
