use std::sync::Mutex;

use engine_logging::{engine_debug, engine_info};
use treehouse_engine::{DownloadEvent, ProgressSink, SkipReason};

/// Bytes between two progress lines of one download.
const REPORT_EVERY: u64 = 16 * 1024 * 1024;

/// Reports download progress through the logger.
#[derive(Debug, Default)]
pub struct LogProgressSink {
    next_report: Mutex<u64>,
}

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: DownloadEvent) {
        match event {
            DownloadEvent::StagesDiscovered { stages, steps } => {
                engine_info!("Course has {} stage(s) and {} video(s)", stages, steps);
            }
            DownloadEvent::DownloadStarted { .. } => {
                if let Ok(mut next) = self.next_report.lock() {
                    *next = REPORT_EVERY;
                }
            }
            DownloadEvent::DownloadProgress { step, bytes } => {
                if let Ok(mut next) = self.next_report.lock() {
                    if bytes >= *next {
                        engine_info!("{}: {} MiB received", step, bytes / (1024 * 1024));
                        *next = bytes + REPORT_EVERY;
                    }
                }
            }
            DownloadEvent::DownloadCompleted { step, path, bytes } => {
                engine_info!("{}: saved {} ({})", step, path.display(), human_bytes(bytes));
            }
            DownloadEvent::StepSkipped {
                step,
                reason: SkipReason::AlreadyDownloaded,
                ..
            } => {
                engine_debug!("{}: in ledger", step);
            }
            _ => {}
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
