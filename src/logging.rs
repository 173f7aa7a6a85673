//! Logging and terminal progress.
//!
//! [`init`] installs a registry with a JSON file layer on a daily rolling
//! appender and a compact stderr layer. `RUST_LOG` overrides both
//! configured filters.

use std::fs;
use std::io;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::session::{Milestone, ProgressSink};

const LOG_FILE: &str = "yeti-session.log";

fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize logging.
///
/// Returns the file writer's guard when file logging is enabled. Keep it
/// alive until exit so buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .compact()
        .with_target(false)
        .with_filter(filter(&config.stderr_level));

    let mut guard = None;
    let file_layer = if config.file {
        let log_dir = config.log_dir();
        match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .json()
                        .with_file(true)
                        .with_line_number(true)
                        .with_target(true)
                        .with_filter(filter(&config.level)),
                )
            }
            Err(e) => {
                eprintln!(
                    "Failed to create log directory {}: {e}",
                    log_dir.display()
                );
                None
            }
        }
    } else {
        None
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {e}");
        return guard;
    }

    // A no-op when the subscriber already bridged `log` records.
    let _ = tracing_log::LogTracer::init();

    if guard.is_some() {
        tracing::debug!(dir = %config.log_dir().display(), "file logging enabled");
    }
    guard
}

/// Progress bar on stderr driven by session milestones.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.green/white}] {pos:>3}% {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn milestone(&self, milestone: Milestone) {
        self.bar.set_position(u64::from(milestone.percent()));
        self.bar.set_message(milestone.label());
    }

    fn finish(&self, message: &str) {
        self.bar.set_position(100);
        self.bar
            .finish_with_message(style(message).green().bold().to_string());
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
