//! Session orchestrator.
//!
//! Decides from persisted state alone which remote steps must run, runs
//! them in order and persists each result only after the step succeeded.
//! A failed run leaves the last persisted state in place; the next run
//! re-evaluates from scratch.
//!
//! Decision order for [`SessionOrchestrator::ensure_authenticated`]:
//!
//! 1. No credentials: nothing to do.
//! 2. No device id: generate and persist one.
//! 3. Unexpired service session: nothing to do.
//! 4. No OAuth token, or an expired one with no service session: log in.
//! 5. Expired service session: refresh it. Success ends the run; failure
//!    falls through to 6 and is reported as [`Outcome::Recovered`].
//! 6. No service session: anonymous login, escalation, device binding and,
//!    if not yet known, the household.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::backend::AuthBackend;
use super::error::{Error, ErrorKind, Result};
use super::model::{Credentials, DeviceIdentity, HouseholdBinding, OAuthToken, ServiceSession};
use super::ott::{DeviceBrand, HouseholdDevice, StreamingDevice};
use super::progress::{Milestone, NoProgress, ProgressSink};
use super::state::SessionState;
use super::storage::SettingsStore;

/// How a call to `ensure_authenticated` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Credentials are not configured; nothing was done.
    MissingCredentials,
    /// The persisted session was still valid.
    AlreadyValid,
    /// The expired session was refreshed.
    Refreshed,
    /// A new session was derived through escalation.
    Escalated,
    /// The expired session could not be refreshed and a new one was
    /// derived through escalation. `refresh` classifies the refresh failure;
    /// [`ErrorKind::Rejected`] means the server refused the refresh token.
    Recovered { refresh: ErrorKind },
}

impl Outcome {
    /// True when a usable session exists after the run.
    pub fn is_authenticated(self) -> bool {
        !matches!(self, Self::MissingCredentials)
    }
}

/// Top-level session state machine.
pub struct SessionOrchestrator<B, S> {
    backend: B,
    state: SessionState<S>,
    progress: Arc<dyn ProgressSink>,
}

impl<B: AuthBackend, S: SettingsStore> SessionOrchestrator<B, S> {
    pub fn new(backend: B, store: S) -> Self {
        Self {
            backend,
            state: SessionState::new(store),
            progress: Arc::new(NoProgress),
        }
    }

    /// Report milestones to `sink`.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn state(&self) -> &SessionState<S> {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bring the persisted session up to date as of now.
    pub async fn ensure_authenticated(&self) -> Result<Outcome> {
        self.ensure_authenticated_at(Utc::now().timestamp()).await
    }

    /// Bring the persisted session up to date as of `now` (Unix seconds).
    #[instrument(skip(self), fields(store = self.state.store().name()))]
    pub async fn ensure_authenticated_at(&self, now: i64) -> Result<Outcome> {
        let Some(credentials) = self.state.credentials().await? else {
            info!("no credentials configured");
            return Ok(Outcome::MissingCredentials);
        };

        let device = match self.state.device_identity().await? {
            Some(device) => device,
            None => {
                let device = DeviceIdentity::generate();
                self.state.save_device_identity(&device).await?;
                info!(device = %device, "generated device id");
                device
            }
        };

        let session = self.state.service_session().await?;
        if let Some(session) = &session {
            if session.is_valid_at(now) {
                debug!(expires_at = session.expires_at, "service session still valid");
                return Ok(Outcome::AlreadyValid);
            }
        }

        let mut oauth = self.state.oauth_token().await?;
        let needs_login = match &oauth {
            None => true,
            Some(token) => token.is_expired(now) && session.is_none(),
        };
        if needs_login {
            oauth = Some(self.login(&credentials, &device, now).await?);
        }

        let mut refresh_failure = None;
        if let Some(stale) = session {
            match self.refresh(&stale, &device).await? {
                None => {
                    self.progress.finish("Session refreshed");
                    return Ok(Outcome::Refreshed);
                }
                failure => refresh_failure = failure,
            }
        }

        let oauth = match oauth {
            Some(token) if !token.is_expired(now) => token,
            _ => self.login(&credentials, &device, now).await?,
        };
        self.escalate(&oauth, &device).await?;
        self.progress.finish("Signed in");
        Ok(match refresh_failure {
            Some(refresh) => Outcome::Recovered { refresh },
            None => Outcome::Escalated,
        })
    }

    async fn login(
        &self,
        credentials: &Credentials,
        device: &DeviceIdentity,
        now: i64,
    ) -> Result<OAuthToken> {
        self.progress.milestone(Milestone::OAuthLogin);
        let grant = self.backend.authorize(credentials, device).await?;
        let token = OAuthToken::from_grant(grant, now);
        self.state.save_oauth_token(&token).await?;
        Ok(token)
    }

    /// Try to refresh `stale`. Returns the kind of the failure when the
    /// caller must re-derive, `None` once the refreshed session is stored.
    ///
    /// A rejected refresh token is dead, so the stale session is cleared
    /// before re-deriving and can never be replayed. Transport and protocol
    /// failures leave it untouched.
    async fn refresh(
        &self,
        stale: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<Option<ErrorKind>> {
        self.progress.milestone(Milestone::SessionRefresh);
        match self.backend.refresh_session(stale, device).await {
            Ok(fresh) => {
                self.persist_refreshed(stale, &fresh).await?;
                Ok(None)
            }
            Err(err) if err.is_login_failure() => {
                warn!(error = %err, "session refresh rejected, starting over");
                self.state.clear_service_session().await?;
                Ok(Some(err.kind()))
            }
            Err(err) => {
                warn!(error = %err, "session refresh failed, starting over");
                Ok(Some(err.kind()))
            }
        }
    }

    /// Persist a refreshed session unless another process already rotated it.
    async fn persist_refreshed(&self, stale: &ServiceSession, fresh: &ServiceSession) -> Result<()> {
        if let Some(current) = self.state.service_session().await? {
            if current.ks_token != stale.ks_token && current.expires_at > stale.expires_at {
                info!(
                    expires_at = current.expires_at,
                    "session already rotated by another process, keeping it"
                );
                return Ok(());
            }
        }
        self.state.save_service_session(fresh).await
    }

    async fn escalate(&self, oauth: &OAuthToken, device: &DeviceIdentity) -> Result<()> {
        self.progress.milestone(Milestone::AnonymousSession);
        let anonymous = self.backend.anonymous_login().await?;

        self.progress.milestone(Milestone::Escalation);
        let session = self
            .backend
            .escalate(&anonymous, &oauth.access_token, device)
            .await?;

        self.progress.milestone(Milestone::DeviceRegistration);
        self.bind_device(&session, device).await?;

        let household = if self.state.household().await?.is_none() {
            self.progress.milestone(Milestone::Household);
            match self.backend.household(&session).await {
                Ok(binding) => Some(binding),
                Err(err) => {
                    warn!(error = %err, "household lookup failed, will retry on next escalation");
                    None
                }
            }
        } else {
            None
        };

        self.state
            .save_escalation(&session, household.as_ref())
            .await
    }

    /// Look the device up and register it if the household does not know it.
    async fn bind_device(&self, session: &ServiceSession, device: &DeviceIdentity) -> Result<()> {
        let confirmed = match self.backend.get_registered_device_id(session).await {
            Ok(id) => id,
            Err(err) if err.is_device_not_registered() => {
                info!(device = %device, "device not in household, registering");
                self.backend.register_device(session, device).await?
            }
            Err(err) => return Err(err),
        };

        if confirmed != device.as_str() {
            return Err(Error::DeviceIdMismatch {
                expected: device.device_id.clone(),
                actual: confirmed,
            });
        }
        Ok(())
    }

    /// KS token of the persisted session, if any.
    pub async fn current_ks_token(&self) -> Result<Option<String>> {
        Ok(self.state.service_session().await?.map(|s| s.ks_token))
    }

    /// Ensure a session and return it.
    pub async fn require_session(&self) -> Result<ServiceSession> {
        let outcome = self.ensure_authenticated().await?;
        if !outcome.is_authenticated() {
            return Err(Error::config("credentials are not configured"));
        }
        self.state
            .service_session()
            .await?
            .ok_or_else(|| Error::storage("session missing right after authentication"))
    }

    /// Forget tokens and household; keep credentials and the device id.
    #[instrument(skip(self))]
    pub async fn reset_session(&self) -> Result<()> {
        self.state.reset_session().await?;
        info!("session reset");
        Ok(())
    }

    /// Remove a device from the household.
    ///
    /// Removing this install's own device also forgets all persisted state
    /// except credentials, so the next run registers a new identity.
    #[instrument(skip(self))]
    pub async fn remove_device(&self, device_id: &str) -> Result<()> {
        let session = self.require_session().await?;
        self.backend.delete_device(&session, device_id).await?;

        let own = self.state.device_identity().await?;
        if own.as_ref().map(DeviceIdentity::as_str) == Some(device_id) {
            self.state.forget_device().await?;
            info!("removed this device, local state cleared");
        }
        Ok(())
    }

    /// Replace this install's device id and retire the old one.
    #[instrument(skip(self))]
    pub async fn rotate_device(&self) -> Result<DeviceIdentity> {
        let old = self.state.device_identity().await?;
        self.state.forget_device().await?;

        let session = self.require_session().await?;
        let new = self
            .state
            .device_identity()
            .await?
            .ok_or_else(|| Error::storage("device id missing right after authentication"))?;

        if let Some(old) = old.filter(|old| old != &new) {
            self.backend.delete_device(&session, old.as_str()).await?;
            info!(old = %old, new = %new, "device id rotated");
        }
        Ok(new)
    }

    /// Forget everything, credentials included.
    pub async fn logout(&self) -> Result<()> {
        self.state.forget_all().await
    }

    pub async fn household(&self) -> Result<Option<HouseholdBinding>> {
        self.state.household().await
    }

    pub async fn list_devices(&self) -> Result<Vec<HouseholdDevice>> {
        let session = self.require_session().await?;
        self.backend.list_devices(&session).await
    }

    pub async fn streaming_devices(&self) -> Result<Vec<StreamingDevice>> {
        let session = self.require_session().await?;
        self.backend.streaming_devices(&session).await
    }

    pub async fn device_brands(&self) -> Result<Vec<DeviceBrand>> {
        let session = self.require_session().await?;
        self.backend.device_brands(&session).await
    }
}
