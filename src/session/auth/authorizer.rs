//! Headless OAuth authorization-code exchange with PKCE.
//!
//! The identity provider only offers an interactive login. We drive it
//! without a browser:
//!
//! 1. **Discovery**: a device blob is sent to the feature-flag service, which
//!    answers with the OAuth client parameters.
//! 2. **Credentials**: the challenge/response login form is fetched, its
//!    first two callbacks are filled with username and password, and it is
//!    posted back. The returned `tokenId` becomes the session cookie.
//! 3. **Code exchange**: the authorize endpoint redirects to the web client
//!    with a `code`, which is exchanged for tokens together with the PKCE
//!    verifier.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::session::endpoints::{os_version, Endpoints, PlatformProfile};
use crate::session::error::{lenient_code, AuthError, Error, Result};
use crate::session::http::{read_body, HttpSession};
use crate::session::model::{Credentials, DeviceIdentity, OAuthGrant};
use crate::session::pkce::{ChallengeMethod, Pkce};

/// Cookie carrying the identity provider session.
pub const SESSION_COOKIE: &str = "iPlanetDirectoryPro";

/// Placeholder identity the login form expects before credentials are filled.
const FORM_PLACEHOLDER: &str = "anonymous";

/// OAuth parameters sent to the authorize endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
}

/// Result of parameter discovery: the request parameters and their PKCE pair.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub params: AuthParams,
    pub pkce: Pkce,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceContext<'a> {
    application_name: &'a str,
    client_tag: &'a str,
    client_version: &'a str,
    consumer_email: &'a str,
    platform: &'a str,
    device_brand: &'a str,
    device_family: &'a str,
    firmware: &'a str,
    partner_id: &'a str,
    release: String,
    tvpil_version: &'a str,
    os_version: &'a str,
}

#[derive(Debug, Serialize)]
struct DiscoveryUser<'a> {
    key: &'a str,
    name: &'a str,
    anonymous: bool,
    custom: DeviceContext<'a>,
}

#[derive(Debug, Deserialize)]
struct LoginRejection {
    message: String,
    #[serde(default, deserialize_with = "lenient_code")]
    code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginSuccess {
    token_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Drives the three-step OAuth login.
#[derive(Debug, Clone)]
pub struct OAuthAuthorizer {
    http: HttpSession,
    endpoints: Endpoints,
    profile: PlatformProfile,
}

impl OAuthAuthorizer {
    pub fn new(http: HttpSession, endpoints: Endpoints, profile: PlatformProfile) -> Self {
        Self {
            http,
            endpoints,
            profile,
        }
    }

    /// Run the full login and return the token pair.
    ///
    /// The expiry is relative; callers anchor it with
    /// [`OAuthToken::from_grant`](crate::session::model::OAuthToken::from_grant).
    #[instrument(skip(self, credentials, device), fields(device = %device))]
    pub async fn authorize(
        &self,
        credentials: &Credentials,
        device: &DeviceIdentity,
    ) -> Result<OAuthGrant> {
        let discovery = self.discover(device).await?;
        self.submit_credentials(credentials, device, &discovery.params)
            .await?;
        let code = self.request_code(device, &discovery.params).await?;
        let grant = self.exchange_code(device, &discovery, &code).await?;
        info!(expires_in = grant.expires_in, "OAuth login complete");
        Ok(grant)
    }

    /// Discover the OAuth client parameters and generate a PKCE pair for them.
    #[instrument(skip(self, device), fields(device = %device))]
    pub async fn discover(&self, device: &DeviceIdentity) -> Result<Discovery> {
        let url = format!("{}{}", self.endpoints.oauth_params_base, self.device_blob(device)?);
        let header = HeaderName::from_bytes(self.endpoints.sdk_user_agent_header.as_bytes())
            .map_err(|e| Error::config(format!("invalid SDK header name: {e}")))?;

        let response = self
            .http
            .client()
            .get(&url)
            .header(header, self.profile.sdk_user_agent.as_str())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(Error::protocol(format!(
                "parameter discovery returned HTTP {status}"
            )));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| Error::protocol(format!("parameter discovery returned invalid JSON: {e}")))?;
        let values = json
            .pointer("/AUTH_PARAMS/value")
            .filter(|v| v.is_object())
            .ok_or_else(|| Error::protocol("AUTH_PARAMS not found in discovery response"))?;

        let required = |field: &str| -> Result<String> {
            values
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::protocol(format!("{field} not found in discovery response")))
        };
        required("oauthBaseUrl")?;
        let response_type = required("oAuthResponseType")?;
        let client_id = required("oAuthClientId")?;
        let method_name = required("oAuthCodeChallengeMethod")?;
        let scope = required("oAuthScope")?;

        let pkce = Pkce::generate_with(ChallengeMethod::parse(&method_name)?);
        debug!(client_id = %client_id, method = %method_name, "OAuth parameters discovered");

        Ok(Discovery {
            params: AuthParams {
                response_type,
                client_id,
                redirect_uri: self.endpoints.redirect_uri(),
                code_challenge: pkce.challenge.clone(),
                code_challenge_method: method_name,
                scope,
            },
            pkce,
        })
    }

    /// Base64 of the compact JSON device description sent to discovery.
    fn device_blob(&self, device: &DeviceIdentity) -> Result<String> {
        let profile = &self.profile;
        let user = DiscoveryUser {
            key: device.as_str(),
            name: FORM_PLACEHOLDER,
            anonymous: true,
            custom: DeviceContext {
                application_name: &self.endpoints.app_name,
                client_tag: &profile.client_tag,
                client_version: &profile.app_version,
                consumer_email: "",
                platform: &profile.platform,
                device_brand: &profile.device_brand,
                device_family: &profile.device_family,
                firmware: &profile.firmware,
                partner_id: &profile.partner_id,
                release: profile.release(&self.endpoints.app_name),
                tvpil_version: &profile.tv_pil_version,
                os_version: os_version(self.http.user_agent()),
            },
        };
        Ok(STANDARD.encode(serde_json::to_vec(&user)?))
    }

    fn web_headers(device: &DeviceIdentity) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-username"),
            HeaderValue::from_static(FORM_PLACEHOLDER),
        );
        headers.insert(
            HeaderName::from_static("x-password"),
            HeaderValue::from_static(FORM_PLACEHOLDER),
        );
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(
            HeaderName::from_static("x-device-id"),
            HeaderValue::from_str(device.as_str())
                .map_err(|e| Error::config(format!("device id is not a valid header: {e}")))?,
        );
        Ok(headers)
    }

    /// Fill and submit the login form, then install the session cookie.
    #[instrument(skip_all)]
    async fn submit_credentials(
        &self,
        credentials: &Credentials,
        device: &DeviceIdentity,
        params: &AuthParams,
    ) -> Result<()> {
        let url = self.endpoints.authenticate_url();
        let goto = format!(
            "{}?{}",
            self.endpoints.authorize_url,
            encode_auth_params(params)?
        );
        let query = [("realm", format!("/{}", self.profile.realm)), ("goto", goto)];
        let headers = Self::web_headers(device)?;

        let response = self
            .http
            .client()
            .post(&url)
            .query(&query)
            .headers(headers.clone())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(login_rejection(status, &body));
        }

        let mut form: Value = serde_json::from_str(&body)
            .map_err(|e| Error::protocol(format!("login form is not JSON: {e}")))?;
        fill_callback(&mut form, 0, &credentials.username)?;
        fill_callback(&mut form, 1, &credentials.password)?;

        let response = self
            .http
            .client()
            .post(&url)
            .query(&query)
            .headers(headers)
            .json(&form)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            let err = login_rejection(status, &body);
            warn!(status = status.as_u16(), "credentials rejected");
            return Err(err);
        }

        let success: LoginSuccess = serde_json::from_str(&body)
            .map_err(|e| Error::protocol(format!("login response has no tokenId: {e}")))?;
        self.http.set_cookie(
            SESSION_COOKIE,
            &success.token_id,
            &self.endpoints.oauth_cookie_url()?,
        );
        debug!("identity provider session established");
        Ok(())
    }

    /// Request an authorization code. The code arrives in the redirect target.
    #[instrument(skip_all)]
    async fn request_code(&self, device: &DeviceIdentity, params: &AuthParams) -> Result<String> {
        let response = self
            .http
            .client()
            .get(&self.endpoints.authorize_url)
            .query(params)
            .headers(Self::web_headers(device)?)
            .send()
            .await?;

        let target = if response.status().is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| Error::protocol("authorize redirect has no Location"))?;
            response.url().join(location)?
        } else {
            response.url().clone()
        };

        code_from_redirect(&target)
    }

    /// Exchange the authorization code and PKCE verifier for tokens.
    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        device: &DeviceIdentity,
        discovery: &Discovery,
        code: &str,
    ) -> Result<OAuthGrant> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", discovery.params.client_id.as_str()),
            ("code", code),
            ("redirect_uri", discovery.params.redirect_uri.as_str()),
            ("code_verifier", discovery.pkce.verifier.as_str()),
        ];
        let response = self
            .http
            .client()
            .post(&self.endpoints.access_token_url)
            .headers(Self::web_headers(device)?)
            .form(&form)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                warn!(
                    error = %error.error,
                    description = ?error.error_description,
                    "token exchange failed"
                );
                return Err(AuthError::login_failed(
                    error.error_description.unwrap_or(error.error),
                    i64::from(status.as_u16()),
                )
                .into());
            }
            return Err(Error::protocol(format!(
                "token exchange returned HTTP {status}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::protocol(format!("token response is malformed: {e}")))
    }
}

fn encode_auth_params(params: &AuthParams) -> Result<String> {
    let mut url = Url::parse("http://localhost/")?;
    url.query_pairs_mut()
        .append_pair("response_type", &params.response_type)
        .append_pair("client_id", &params.client_id)
        .append_pair("redirect_uri", &params.redirect_uri)
        .append_pair("code_challenge", &params.code_challenge)
        .append_pair("code_challenge_method", &params.code_challenge_method)
        .append_pair("scope", &params.scope);
    Ok(url.query().unwrap_or_default().to_string())
}

/// Set `callbacks[index].input[0].value` of a login form.
fn fill_callback(form: &mut Value, index: usize, value: &str) -> Result<()> {
    let slot = form
        .pointer_mut(&format!("/callbacks/{index}/input/0/value"))
        .ok_or_else(|| Error::protocol(format!("login form has no callback {index}")))?;
    *slot = Value::String(value.to_string());
    Ok(())
}

/// Map a failed login step to `LoginFailed`, keeping the server's message and code.
fn login_rejection(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<LoginRejection>(body) {
        Ok(rejection) => AuthError::login_failed(rejection.message, rejection.code).into(),
        Err(_) => AuthError::login_failed(
            status
                .canonical_reason()
                .unwrap_or("login rejected")
                .to_string(),
            i64::from(status.as_u16()),
        )
        .into(),
    }
}

fn code_from_redirect(target: &Url) -> Result<String> {
    if let Some((_, code)) = target.query_pairs().find(|(k, _)| k == "code") {
        return Ok(code.into_owned());
    }
    match target.query_pairs().find(|(k, _)| k == "error") {
        Some((_, error)) => Err(Error::protocol(format!("authorization refused: {error}"))),
        None => Err(Error::protocol("authorization response carried no code")),
    }
}
