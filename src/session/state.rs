//! Typed access to persisted session state.
//!
//! Entities span several settings keys. Reads treat an entity as absent
//! unless every field is present and parses; writes go through
//! [`SettingsStore::set_many`] so each entity is replaced wholesale.

use tracing::{debug, warn};

use super::error::Result;
use super::model::{
    Credentials, DeviceIdentity, HouseholdBinding, OAuthToken, ServiceSession,
};
use super::storage::SettingsStore;

/// Settings keys.
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const DEVICE_KEY: &str = "devicekey";
    pub const OAUTH_ACCESS_TOKEN: &str = "oauthaccesstoken";
    pub const OAUTH_REFRESH_TOKEN: &str = "oauthrefreshtoken";
    pub const OAUTH_EXPIRES: &str = "oauthexpires";
    pub const KS_TOKEN: &str = "kstoken";
    pub const KS_REFRESH_TOKEN: &str = "ksrefreshtoken";
    pub const KS_EXPIRY: &str = "ksexpiry";
    pub const HOUSEHOLD_ID: &str = "householdid";
    pub const USER_ID: &str = "userid";
    pub const USER_AGENT: &str = "useragent";

    pub const CREDENTIALS: &[&str] = &[USERNAME, PASSWORD];
    pub const OAUTH: &[&str] = &[OAUTH_ACCESS_TOKEN, OAUTH_REFRESH_TOKEN, OAUTH_EXPIRES];
    pub const SERVICE_SESSION: &[&str] = &[KS_TOKEN, KS_REFRESH_TOKEN, KS_EXPIRY];
    pub const HOUSEHOLD: &[&str] = &[HOUSEHOLD_ID, USER_ID];
}

/// Presence and expiry of each entity, safe to print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub has_credentials: bool,
    pub device_id: Option<String>,
    pub oauth_expires_at: Option<i64>,
    pub session_expires_at: Option<i64>,
    pub household: Option<HouseholdBinding>,
}

/// Typed view over a [`SettingsStore`].
#[derive(Debug, Clone)]
pub struct SessionState<S> {
    store: S,
}

impl<S: SettingsStore> SessionState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    async fn value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(key).await?.filter(|v| !v.is_empty()))
    }

    async fn timestamp(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.value(key).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>() {
            Ok(ts) => Ok(Some(ts)),
            Err(_) => {
                warn!(key, "ignoring unparseable timestamp");
                Ok(None)
            }
        }
    }

    pub async fn credentials(&self) -> Result<Option<Credentials>> {
        let username = self.value(keys::USERNAME).await?;
        let password = self.value(keys::PASSWORD).await?;
        Ok(username
            .zip(password)
            .map(|(username, password)| Credentials { username, password }))
    }

    pub async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.store
            .set_many(&[
                (keys::USERNAME, credentials.username.clone()),
                (keys::PASSWORD, credentials.password.clone()),
            ])
            .await
    }

    pub async fn device_identity(&self) -> Result<Option<DeviceIdentity>> {
        Ok(self.value(keys::DEVICE_KEY).await?.map(DeviceIdentity::new))
    }

    pub async fn save_device_identity(&self, identity: &DeviceIdentity) -> Result<()> {
        self.store.set(keys::DEVICE_KEY, identity.as_str()).await
    }

    pub async fn oauth_token(&self) -> Result<Option<OAuthToken>> {
        let access_token = self.value(keys::OAUTH_ACCESS_TOKEN).await?;
        let refresh_token = self.value(keys::OAUTH_REFRESH_TOKEN).await?;
        let expires_at = self.timestamp(keys::OAUTH_EXPIRES).await?;
        Ok(match (access_token, refresh_token, expires_at) {
            (Some(access_token), Some(refresh_token), Some(expires_at)) => Some(OAuthToken {
                access_token,
                refresh_token,
                expires_at,
            }),
            _ => None,
        })
    }

    pub async fn save_oauth_token(&self, token: &OAuthToken) -> Result<()> {
        debug!(expires_at = token.expires_at, "persisting OAuth token");
        self.store
            .set_many(&[
                (keys::OAUTH_ACCESS_TOKEN, token.access_token.clone()),
                (keys::OAUTH_REFRESH_TOKEN, token.refresh_token.clone()),
                (keys::OAUTH_EXPIRES, token.expires_at.to_string()),
            ])
            .await
    }

    pub async fn service_session(&self) -> Result<Option<ServiceSession>> {
        let ks_token = self.value(keys::KS_TOKEN).await?;
        let refresh_token = self.value(keys::KS_REFRESH_TOKEN).await?;
        let expires_at = self.timestamp(keys::KS_EXPIRY).await?;
        Ok(match (ks_token, refresh_token, expires_at) {
            (Some(ks_token), Some(refresh_token), Some(expires_at)) => Some(ServiceSession {
                ks_token,
                refresh_token,
                expires_at,
            }),
            _ => None,
        })
    }

    pub async fn save_service_session(&self, session: &ServiceSession) -> Result<()> {
        debug!(expires_at = session.expires_at, "persisting service session");
        self.store.set_many(&session_entries(session)).await
    }

    pub async fn clear_service_session(&self) -> Result<()> {
        self.store.clear_many(keys::SERVICE_SESSION).await
    }

    pub async fn household(&self) -> Result<Option<HouseholdBinding>> {
        let household_id = self.value(keys::HOUSEHOLD_ID).await?;
        let user_id = self.value(keys::USER_ID).await?;
        Ok(match (household_id, user_id) {
            (Some(household_id), Some(user_id)) => match household_id.parse() {
                Ok(household_id) => Some(HouseholdBinding {
                    household_id,
                    user_id,
                }),
                Err(_) => {
                    warn!("ignoring unparseable household id");
                    None
                }
            },
            _ => None,
        })
    }

    /// Persist an escalated session, and the household binding if given, in one write.
    pub async fn save_escalation(
        &self,
        session: &ServiceSession,
        household: Option<&HouseholdBinding>,
    ) -> Result<()> {
        let mut entries = session_entries(session).to_vec();
        if let Some(binding) = household {
            entries.push((keys::HOUSEHOLD_ID, binding.household_id.to_string()));
            entries.push((keys::USER_ID, binding.user_id.clone()));
        }
        debug!(
            expires_at = session.expires_at,
            with_household = household.is_some(),
            "persisting escalated session"
        );
        self.store.set_many(&entries).await
    }

    pub async fn user_agent(&self) -> Result<Option<String>> {
        self.value(keys::USER_AGENT).await
    }

    pub async fn save_user_agent(&self, user_agent: &str) -> Result<()> {
        self.store.set(keys::USER_AGENT, user_agent).await
    }

    /// Clear OAuth token, service session, household binding and user agent.
    pub async fn reset_session(&self) -> Result<()> {
        self.store.clear_many(&session_keys()).await
    }

    /// [`SessionState::reset_session`] plus the device identity.
    pub async fn forget_device(&self) -> Result<()> {
        let mut to_clear = session_keys();
        to_clear.push(keys::DEVICE_KEY);
        self.store.clear_many(&to_clear).await
    }

    /// Clear everything including credentials.
    pub async fn forget_all(&self) -> Result<()> {
        let mut to_clear = session_keys();
        to_clear.push(keys::DEVICE_KEY);
        to_clear.extend_from_slice(keys::CREDENTIALS);
        self.store.clear_many(&to_clear).await
    }

    pub async fn summary(&self) -> Result<StateSummary> {
        Ok(StateSummary {
            has_credentials: self.credentials().await?.is_some(),
            device_id: self.device_identity().await?.map(|d| d.device_id),
            oauth_expires_at: self.oauth_token().await?.map(|t| t.expires_at),
            session_expires_at: self.service_session().await?.map(|s| s.expires_at),
            household: self.household().await?,
        })
    }
}

fn session_entries(session: &ServiceSession) -> [(&'static str, String); 3] {
    [
        (keys::KS_TOKEN, session.ks_token.clone()),
        (keys::KS_REFRESH_TOKEN, session.refresh_token.clone()),
        (keys::KS_EXPIRY, session.expires_at.to_string()),
    ]
}

fn session_keys() -> Vec<&'static str> {
    let mut all = Vec::with_capacity(9);
    all.extend_from_slice(keys::OAUTH);
    all.extend_from_slice(keys::SERVICE_SESSION);
    all.extend_from_slice(keys::HOUSEHOLD);
    all.push(keys::USER_AGENT);
    all
}
