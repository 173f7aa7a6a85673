//! Anonymous bootstrap, escalation and KS refresh.

use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{info, instrument, warn};

use super::{fields, OttCall, OttClient};
use crate::session::error::{AuthError, Error, Result};
use crate::session::model::{AnonymousSession, DeviceIdentity, ServiceSession};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginSession {
    ks: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expiry: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    login_session: LoginSession,
}

impl TryFrom<LoginSession> for ServiceSession {
    type Error = Error;

    /// A user session must carry a refresh token.
    fn try_from(raw: LoginSession) -> Result<Self> {
        let refresh_token = raw
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::protocol("login session has no refreshToken"))?;
        Ok(Self {
            ks_token: raw.ks,
            refresh_token,
            expires_at: raw.expiry,
        })
    }
}

impl OttClient {
    /// Obtain an anonymous KS. Any server fault is a protocol error.
    #[instrument(skip(self))]
    pub async fn anonymous_login(&self) -> Result<AnonymousSession> {
        let raw: LoginSession = self
            .call(OttCall::AnonymousLogin, None, Map::new())
            .await?
            .map_err(|fault| {
                Error::protocol(format!(
                    "anonymous login rejected: {} ({})",
                    fault.message, fault.code
                ))
            })?;
        info!(expires_at = raw.expiry, "anonymous session opened");
        Ok(AnonymousSession {
            ks_token: raw.ks,
            refresh_token: raw.refresh_token.unwrap_or_default(),
            expires_at: raw.expiry,
        })
    }

    /// Upgrade an anonymous KS to a user session with the OAuth access token.
    #[instrument(skip(self, anonymous, access_token, device), fields(device = %device))]
    pub async fn escalate(
        &self,
        anonymous: &AnonymousSession,
        access_token: &str,
        device: &DeviceIdentity,
    ) -> Result<ServiceSession> {
        let string_value = format!("{}StringValue", self.endpoints().platform_name);
        let extra = fields([
            (
                "extraParams",
                json!({
                    "accessToken": { "objectType": string_value, "value": access_token },
                    "loginType": { "objectType": string_value, "value": "accessToken" },
                }),
            ),
            ("password", self.profile().ott_password.clone().into()),
            ("udid", device.as_str().into()),
            ("username", self.profile().ott_username.clone().into()),
        ]);

        let response: LoginResponse = self
            .call(OttCall::Login, Some(&anonymous.ks_token), extra)
            .await?
            .map_err(|fault| {
                warn!(code = fault.code, "OTT login rejected");
                AuthError::login_failed(fault.message, fault.code)
            })?;

        let session = ServiceSession::try_from(response.login_session)?;
        info!(expires_at = session.expires_at, "session escalated");
        Ok(session)
    }

    /// Exchange the KS refresh token for a new session.
    #[instrument(skip(self, session, device))]
    pub async fn refresh_session(
        &self,
        session: &ServiceSession,
        device: Option<&DeviceIdentity>,
    ) -> Result<ServiceSession> {
        let mut extra = fields([("refreshToken", session.refresh_token.clone().into())]);
        if let Some(device) = device {
            extra.insert("udid".into(), device.as_str().into());
        }

        let raw: LoginSession = self
            .call(OttCall::RefreshSession, Some(&session.ks_token), extra)
            .await?
            .map_err(|fault| AuthError::refresh_failed(fault.message, fault.code))?;

        let refreshed = ServiceSession::try_from(raw)?;
        info!(expires_at = refreshed.expires_at, "session refreshed");
        Ok(refreshed)
    }
}
