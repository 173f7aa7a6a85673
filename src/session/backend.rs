//! Remote operations the orchestrator depends on.
//!
//! [`AuthBackend`] is the seam between the decision logic and the network.
//! [`YetiClient`] implements it over HTTP; tests substitute a mock.

use async_trait::async_trait;
use std::time::Duration;

use super::auth::OAuthAuthorizer;
use super::endpoints::{Endpoints, PlatformProfile};
use super::error::Result;
use super::http::HttpSession;
use super::model::{
    AnonymousSession, Credentials, DeviceIdentity, HouseholdBinding, OAuthGrant, ServiceSession,
};
use super::ott::{DeviceBrand, HouseholdDevice, OttClient, StreamingDevice};

/// Remote steps of the session lifecycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Full OAuth login. Returns a grant with a relative expiry.
    async fn authorize(
        &self,
        credentials: &Credentials,
        device: &DeviceIdentity,
    ) -> Result<OAuthGrant>;

    async fn anonymous_login(&self) -> Result<AnonymousSession>;

    async fn escalate(
        &self,
        anonymous: &AnonymousSession,
        access_token: &str,
        device: &DeviceIdentity,
    ) -> Result<ServiceSession>;

    async fn refresh_session(
        &self,
        session: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<ServiceSession>;

    /// Fails with `DeviceNotRegistered` for devices outside the household.
    async fn get_registered_device_id(&self, session: &ServiceSession) -> Result<String>;

    async fn register_device(
        &self,
        session: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<String>;

    async fn delete_device(&self, session: &ServiceSession, device_id: &str) -> Result<()>;

    async fn household(&self, session: &ServiceSession) -> Result<HouseholdBinding>;

    async fn list_devices(&self, session: &ServiceSession) -> Result<Vec<HouseholdDevice>>;

    async fn streaming_devices(&self, session: &ServiceSession) -> Result<Vec<StreamingDevice>>;

    async fn device_brands(&self, session: &ServiceSession) -> Result<Vec<DeviceBrand>>;
}

/// HTTP implementation of [`AuthBackend`].
///
/// The authorizer and the OTT client share one [`HttpSession`], and with it
/// one cookie jar.
#[derive(Debug, Clone)]
pub struct YetiClient {
    authorizer: OAuthAuthorizer,
    ott: OttClient,
}

impl YetiClient {
    pub fn new(endpoints: Endpoints, profile: PlatformProfile, http: HttpSession) -> Self {
        Self {
            authorizer: OAuthAuthorizer::new(http.clone(), endpoints.clone(), profile.clone()),
            ott: OttClient::new(http, endpoints, profile),
        }
    }

    /// Build a client with its own HTTP session.
    pub fn with_user_agent(
        endpoints: Endpoints,
        profile: PlatformProfile,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = HttpSession::new(user_agent, timeout)?;
        Ok(Self::new(endpoints, profile, http))
    }

    pub fn authorizer(&self) -> &OAuthAuthorizer {
        &self.authorizer
    }

    pub fn ott(&self) -> &OttClient {
        &self.ott
    }
}

#[async_trait]
impl AuthBackend for YetiClient {
    async fn authorize(
        &self,
        credentials: &Credentials,
        device: &DeviceIdentity,
    ) -> Result<OAuthGrant> {
        self.authorizer.authorize(credentials, device).await
    }

    async fn anonymous_login(&self) -> Result<AnonymousSession> {
        self.ott.anonymous_login().await
    }

    async fn escalate(
        &self,
        anonymous: &AnonymousSession,
        access_token: &str,
        device: &DeviceIdentity,
    ) -> Result<ServiceSession> {
        self.ott.escalate(anonymous, access_token, device).await
    }

    async fn refresh_session(
        &self,
        session: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<ServiceSession> {
        self.ott.refresh_session(session, Some(device)).await
    }

    async fn get_registered_device_id(&self, session: &ServiceSession) -> Result<String> {
        self.ott.get_registered_device_id(session).await
    }

    async fn register_device(
        &self,
        session: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<String> {
        self.ott.register_device(session, device).await
    }

    async fn delete_device(&self, session: &ServiceSession, device_id: &str) -> Result<()> {
        self.ott.delete_device(session, device_id).await
    }

    async fn household(&self, session: &ServiceSession) -> Result<HouseholdBinding> {
        self.ott.household(session).await
    }

    async fn list_devices(&self, session: &ServiceSession) -> Result<Vec<HouseholdDevice>> {
        self.ott.list_devices(session).await
    }

    async fn streaming_devices(&self, session: &ServiceSession) -> Result<Vec<StreamingDevice>> {
        self.ott.streaming_devices(session).await
    }

    async fn device_brands(&self, session: &ServiceSession) -> Result<Vec<DeviceBrand>> {
        self.ott.device_brands(session).await
    }
}
