//! Yeti OTT authentication and session management.
//!
//! The [`orchestrator`] decides which remote steps to run. The [`auth`] and
//! [`ott`] clients talk to the OAuth and OTT services. Everything the next
//! run needs is persisted through a [`storage::SettingsStore`].

pub mod auth;
pub mod backend;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod ott;
pub mod pkce;
pub mod progress;
pub mod state;
pub mod storage;

use std::time::Duration;
use tracing::info;

pub use backend::{AuthBackend, YetiClient};
pub use endpoints::{EndpointOverrides, Endpoints, PlatformProfile};
pub use error::{AuthError, Error, ErrorKind, Result};
pub use model::{
    AnonymousSession, Credentials, DeviceIdentity, HouseholdBinding, OAuthToken, ServiceSession,
};
pub use orchestrator::{Outcome, SessionOrchestrator};
pub use progress::{LogProgress, Milestone, NoProgress, ProgressSink};
pub use state::{SessionState, StateSummary};
pub use storage::{FileSettingsStore, MemorySettingsStore, SettingsStore};

/// The persisted user agent, choosing and saving one on first use.
pub async fn persistent_user_agent<S: SettingsStore>(state: &SessionState<S>) -> Result<String> {
    if let Some(user_agent) = state.user_agent().await? {
        return Ok(user_agent);
    }
    let user_agent = http::random_desktop_user_agent().to_string();
    state.save_user_agent(&user_agent).await?;
    info!(user_agent = %user_agent, "chose user agent");
    Ok(user_agent)
}

/// Build an orchestrator talking to `endpoints` over HTTP, backed by `store`.
pub async fn connect<S: SettingsStore>(
    endpoints: Endpoints,
    profile: PlatformProfile,
    timeout: Duration,
    store: S,
) -> Result<SessionOrchestrator<YetiClient, S>> {
    profile.partner_id()?;
    let state = SessionState::new(store);
    let user_agent = persistent_user_agent(&state).await?;
    let backend = YetiClient::with_user_agent(endpoints, profile, &user_agent, timeout)?;
    Ok(SessionOrchestrator::new(backend, state.into_store()))
}
