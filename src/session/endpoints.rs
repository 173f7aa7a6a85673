//! Service endpoints and platform constants.
//!
//! The production endpoints ship as AES-128-CBC ciphertexts. They are
//! decrypted once per process on first access and then handed out as
//! cheap clones of the memoized [`Endpoints`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const KEY_HEX: &str = "6e6f7479657474767061737377726401";
const IV_HEX: &str = "d70eac75d7d907ef0d2ba8f5bd4c5424";

mod sealed {
    pub const OAUTH_PARAMS_BASE: &str = "OS1xuzVgzAzQHb0KEDeNAVVbEc5urpAxuMnw30sJXQPJTZcz9Sfvc0byVS0UWeDu7HRDmBsdYu/BWC88pbMbewTZmsCIf0r7lJ91CiwcpVY=";
    pub const APP_NAME: &str = "cwkjb/M/Elz+U5QsYzF3r+8bBeNds+MTTfrhcmT2AXU=";
    pub const SDK_USER_AGENT_HEADER: &str = "0seEq7ZG4lhyG6O/BsGuk4UutyJxWjag0wCLytE+2c8=";
    pub const BASE_URL: &str = "ddTYdm/A1BVLoOfZFa+B2l9y7j8Z+Z8GkMn1zVI/CAg=";
    pub const OAUTH_JSON_BASE: &str = "uG8C4/WmxXGhwC46TUC8x0Igfo+4aKKcWfPStlpmBHrD/GkS/NZqxtWeQkHO+KfIwtrqMD7hfzlltMEGvnadTinTtXHGIGnqOHimcv4M/40=";
    pub const ACCESS_TOKEN_URL: &str = "uG8C4/WmxXGhwC46TUC8x5xX5gVLRHfhvRhZKLgqEBeV2Q6WfdsM6c0i5+6qsGcmDYgwq5S9vmRzDpSHfxSC4w==";
    pub const AUTHORIZE_URL: &str = "uG8C4/WmxXGhwC46TUC8x5xX5gVLRHfhvRhZKLgqEBeV2Q6WfdsM6c0i5+6qsGcmdhs5AnO3PAFRxw1/tnvscA==";
    pub const OTT_BASE: &str = "kCdvQby5nD+JHn0w+tlZGD8MwhjEiE8361nLs2zwHmNT5Y+fCWwEg06Z9y1B5Ai2";
    pub const PLATFORM_NAME: &str = "iRgwCNz7uGqqNiEqRNmEUA==";
    pub const OAUTH_DOMAIN: &str = "RpocH1DQwVFTISljFoK+pQ==";
}

static DEFAULTS: Lazy<std::result::Result<Endpoints, String>> =
    Lazy::new(|| Endpoints::decrypt_defaults().map_err(|e| e.to_string()));

/// Decrypt one sealed constant.
pub fn reveal(ciphertext: &str) -> Result<String> {
    let key = hex::decode(KEY_HEX).map_err(|e| Error::config(format!("endpoint key: {e}")))?;
    let iv = hex::decode(IV_HEX).map_err(|e| Error::config(format!("endpoint iv: {e}")))?;
    let data = STANDARD
        .decode(ciphertext)
        .map_err(|e| Error::config(format!("endpoint is not valid base64: {e}")))?;

    let plain = Aes128CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| Error::config(format!("endpoint cipher: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| Error::config("endpoint ciphertext has invalid padding"))?;

    String::from_utf8(plain).map_err(|e| Error::config(format!("endpoint is not UTF-8: {e}")))
}

/// Resolved endpoints and service identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Base of the parameter-discovery endpoint; the encoded device blob is appended.
    pub oauth_params_base: String,
    /// Header carrying the SDK user agent on discovery calls.
    pub sdk_user_agent_header: String,
    /// Application identifier reported to discovery.
    pub app_name: String,
    /// Web front-end origin. The OAuth redirect URI lives under it.
    pub base_url: String,
    /// JSON realm base; the login form is at `{oauth_json_base}authenticate`.
    pub oauth_json_base: String,
    /// OAuth token endpoint.
    pub access_token_url: String,
    /// OAuth authorize endpoint.
    pub authorize_url: String,
    /// OTT API base.
    pub ott_base: String,
    /// Object type prefix, e.g. `KalturaHouseholdDevice`.
    pub platform_name: String,
    /// Host receiving the OAuth session cookie.
    pub oauth_domain: String,
}

/// Optional per-endpoint URL overrides from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    /// Point every endpoint at one host. Applied before the per-field overrides.
    pub base: Option<String>,
    pub oauth_params_base: Option<String>,
    pub base_url: Option<String>,
    pub oauth_json_base: Option<String>,
    pub access_token_url: Option<String>,
    pub authorize_url: Option<String>,
    pub ott_base: Option<String>,
    pub oauth_domain: Option<String>,
}

impl EndpointOverrides {
    /// Check that every URL override parses.
    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("base", &self.base),
            ("oauth_params_base", &self.oauth_params_base),
            ("base_url", &self.base_url),
            ("oauth_json_base", &self.oauth_json_base),
            ("access_token_url", &self.access_token_url),
            ("authorize_url", &self.authorize_url),
            ("ott_base", &self.ott_base),
        ];
        for (name, value) in urls {
            if let Some(value) = value {
                Url::parse(value)
                    .map_err(|e| Error::config(format!("endpoints.{name} '{value}': {e}")))?;
            }
        }
        Ok(())
    }
}

impl Endpoints {
    /// The production endpoints, decrypted once per process.
    pub fn resolve() -> Result<Self> {
        match &*DEFAULTS {
            Ok(endpoints) => Ok(endpoints.clone()),
            Err(e) => Err(Error::config(e.clone())),
        }
    }

    /// Production endpoints with configuration overrides applied.
    pub fn resolve_with(overrides: &EndpointOverrides) -> Result<Self> {
        let mut endpoints = match &overrides.base {
            Some(base) => Self::with_base(base)?,
            None => Self::resolve()?,
        };

        let fields = [
            (&mut endpoints.oauth_params_base, &overrides.oauth_params_base),
            (&mut endpoints.base_url, &overrides.base_url),
            (&mut endpoints.oauth_json_base, &overrides.oauth_json_base),
            (&mut endpoints.access_token_url, &overrides.access_token_url),
            (&mut endpoints.authorize_url, &overrides.authorize_url),
            (&mut endpoints.ott_base, &overrides.ott_base),
            (&mut endpoints.oauth_domain, &overrides.oauth_domain),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        Ok(endpoints)
    }

    /// Route every endpoint to a single host, keeping the production paths' shape.
    ///
    /// Identifiers that are not URLs (app name, header name, platform name)
    /// keep their production values.
    pub fn with_base(base: &str) -> Result<Self> {
        let parsed = Url::parse(base)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config(format!("endpoint base '{base}' has no host")))?
            .to_string();
        let base = base.trim_end_matches('/');
        let defaults = Self::resolve()?;

        Ok(Self {
            oauth_params_base: format!("{base}/sdk/evalx/users/"),
            base_url: base.to_string(),
            oauth_json_base: format!("{base}/openam/json/realms/root/realms/sc-acc-prod/"),
            access_token_url: format!("{base}/openam/oauth2/access_token"),
            authorize_url: format!("{base}/openam/oauth2/authorize"),
            ott_base: format!("{base}/ott/"),
            oauth_domain: host,
            ..defaults
        })
    }

    fn decrypt_defaults() -> Result<Self> {
        Ok(Self {
            oauth_params_base: reveal(sealed::OAUTH_PARAMS_BASE)?,
            sdk_user_agent_header: reveal(sealed::SDK_USER_AGENT_HEADER)?,
            app_name: reveal(sealed::APP_NAME)?,
            base_url: reveal(sealed::BASE_URL)?,
            oauth_json_base: reveal(sealed::OAUTH_JSON_BASE)?,
            access_token_url: reveal(sealed::ACCESS_TOKEN_URL)?,
            authorize_url: reveal(sealed::AUTHORIZE_URL)?,
            ott_base: reveal(sealed::OTT_BASE)?,
            platform_name: reveal(sealed::PLATFORM_NAME)?,
            oauth_domain: reveal(sealed::OAUTH_DOMAIN)?,
        })
    }

    /// Redirect URI registered for the web client.
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/", self.base_url.trim_end_matches('/'))
    }

    /// Challenge/response login form endpoint.
    pub fn authenticate_url(&self) -> String {
        format!("{}authenticate", self.oauth_json_base)
    }

    /// URL of an OTT service action.
    pub fn ott_action_url(&self, service: &str, action: &str) -> String {
        format!("{}api_v3/service/{service}/action/{action}", self.ott_base)
    }

    /// URL the OAuth session cookie is scoped to.
    pub fn oauth_cookie_url(&self) -> Result<Url> {
        let scheme = Url::parse(&self.authorize_url)?.scheme().to_string();
        Ok(Url::parse(&format!("{scheme}://{}/", self.oauth_domain))?)
    }
}

/// Client identity reported to the OAuth and OTT services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformProfile {
    pub app_version: String,
    pub client_tag: String,
    pub platform: String,
    pub device_brand: String,
    pub device_family: String,
    pub firmware: String,
    pub partner_id: String,
    pub tv_pil_version: String,
    pub realm: String,
    pub api_version: String,
    /// Fixed OTT account used together with the OAuth access token.
    pub ott_username: String,
    pub ott_password: String,
    /// Language for authenticated OTT calls.
    pub language: String,
    /// Name shown for this device in the household.
    pub device_name: String,
    /// Value of the SDK user agent header on discovery calls.
    pub sdk_user_agent: String,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self {
            app_version: "1.23.0".into(),
            client_tag: "1.23.0-PC".into(),
            platform: "other".into(),
            device_brand: "22".into(),
            device_family: "5".into(),
            firmware: "n/a".into(),
            partner_id: "3204".into(),
            tv_pil_version: "1.14.0".into(),
            realm: "sc-acc-prod".into(),
            api_version: "5.4.0".into(),
            ott_username: "11111".into(),
            ott_password: "11111".into(),
            language: "hun".into(),
            device_name: String::new(),
            sdk_user_agent: "JSClient/2.24.2".into(),
        }
    }
}

impl PlatformProfile {
    /// Numeric partner id as sent in OTT bodies.
    pub fn partner_id(&self) -> Result<i64> {
        self.partner_id
            .parse()
            .map_err(|_| Error::config(format!("partner_id '{}' is not numeric", self.partner_id)))
    }

    /// Release tag reported to discovery.
    pub fn release(&self, app_name: &str) -> String {
        format!("{app_name}@{}", self.app_version)
    }
}

/// Everything after the first `/` of a user agent, or the whole string.
pub fn os_version(user_agent: &str) -> &str {
    user_agent
        .split_once('/')
        .map_or(user_agent, |(_, rest)| rest)
}
