//! Progress notifications for long-running authentication.
//!
//! The orchestrator reports fixed milestones; presentation decides how to
//! show them.

use std::sync::{Arc, Mutex};
use tracing::info;

/// A step of [`ensure_authenticated`](super::orchestrator::SessionOrchestrator::ensure_authenticated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    OAuthLogin,
    AnonymousSession,
    Escalation,
    SessionRefresh,
    DeviceRegistration,
    Household,
}

impl Milestone {
    /// Percentage shown when the step starts.
    pub fn percent(self) -> u8 {
        match self {
            Self::OAuthLogin => 50,
            Self::AnonymousSession => 65,
            Self::Escalation => 75,
            Self::SessionRefresh | Self::DeviceRegistration => 85,
            Self::Household => 95,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OAuthLogin => "Logging in",
            Self::AnonymousSession => "Opening anonymous session",
            Self::Escalation => "Signing in to the TV service",
            Self::SessionRefresh => "Refreshing session",
            Self::DeviceRegistration => "Registering device",
            Self::Household => "Loading household",
        }
    }
}

/// Receiver of progress notifications.
pub trait ProgressSink: Send + Sync {
    fn milestone(&self, milestone: Milestone);

    /// Called once when the run completes successfully.
    fn finish(&self, _message: &str) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn milestone(&self, milestone: Milestone) {
        (**self).milestone(milestone);
    }

    fn finish(&self, message: &str) {
        (**self).finish(message);
    }
}

/// Discards all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn milestone(&self, _milestone: Milestone) {}
}

/// Emits notifications as `info` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn milestone(&self, milestone: Milestone) {
        info!(percent = milestone.percent(), "{}", milestone.label());
    }

    fn finish(&self, message: &str) {
        info!(percent = 100, "{message}");
    }
}

/// Records milestones in order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    seen: Mutex<Vec<Milestone>>,
    finished: Mutex<Option<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn milestones(&self) -> Vec<Milestone> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn finished(&self) -> Option<String> {
        self.finished.lock().ok().and_then(|f| f.clone())
    }
}

impl ProgressSink for RecordingProgress {
    fn milestone(&self, milestone: Milestone) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(milestone);
        }
    }

    fn finish(&self, message: &str) {
        if let Ok(mut finished) = self.finished.lock() {
            *finished = Some(message.to_string());
        }
    }
}
