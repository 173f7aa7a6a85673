//! Kaltura OTT API client.
//!
//! Every service call shares one request shape: a JSON body carrying
//! `apiVersion`, `clientTag` and `language` (plus `partnerId` and `ks` for
//! some calls), posted to `{ott_base}api_v3/service/{service}/action/{action}`
//! with `format=1&clientTag=…` in the query. [`OttCall`] names the calls and
//! decides the variable parts; [`OttClient::call`] builds and sends them.
//!
//! Responses are wrapped in `{"result": …}`. An application error shows up
//! as `result.error` and is returned as a [`ServerFault`] for the caller to
//! map onto its own error type.

mod devices;
mod household;
mod login;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

pub use devices::{DeviceBrand, HouseholdDevice, StreamingDevice};

use super::endpoints::{Endpoints, PlatformProfile};
use super::error::{lenient_code, Error, Result};
use super::http::{read_body, HttpSession};

/// Language sent by calls made before any user is known.
const ANONYMOUS_LANGUAGE: &str = "*";

/// An OTT service action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OttCall {
    AnonymousLogin,
    Login,
    RefreshSession,
    GetDevice,
    AddDevice,
    DeleteDevice,
    ListDevices,
    ListStreamingDevices,
    ListDeviceBrands,
    GetHousehold,
}

impl OttCall {
    /// `(service, action)` path segments.
    pub fn path(self) -> (&'static str, &'static str) {
        match self {
            Self::AnonymousLogin => ("ottuser", "anonymousLogin"),
            Self::Login => ("ottuser", "login"),
            Self::RefreshSession => ("ottuser", "refreshSession"),
            Self::GetDevice => ("householddevice", "get"),
            Self::AddDevice => ("householddevice", "add"),
            Self::DeleteDevice => ("householddevice", "delete"),
            Self::ListDevices => ("householddevice", "list"),
            Self::ListStreamingDevices => ("streamingdevice", "list"),
            Self::ListDeviceBrands => ("devicebrand", "list"),
            Self::GetHousehold => ("household", "get"),
        }
    }

    /// Calls that identify the partner explicitly instead of through a KS.
    pub fn sends_partner_id(self) -> bool {
        matches!(self, Self::AnonymousLogin | Self::Login)
    }

    pub fn language(self, profile: &PlatformProfile) -> &str {
        match self {
            Self::AnonymousLogin => ANONYMOUS_LANGUAGE,
            _ => &profile.language,
        }
    }
}

/// `result.error` of an OTT response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerFault {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: i64,
}

/// Client for the OTT service actions.
#[derive(Debug, Clone)]
pub struct OttClient {
    http: HttpSession,
    endpoints: Endpoints,
    profile: PlatformProfile,
}

impl OttClient {
    pub fn new(http: HttpSession, endpoints: Endpoints, profile: PlatformProfile) -> Self {
        Self {
            http,
            endpoints,
            profile,
        }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Request body for `call` with `extra` appended after the common ones.
    pub fn body(&self, call: OttCall, ks: Option<&str>, extra: Map<String, Value>) -> Result<Value> {
        let mut body = Map::new();
        body.insert("apiVersion".into(), self.profile.api_version.clone().into());
        body.insert("clientTag".into(), self.profile.client_tag.clone().into());
        body.insert("language".into(), call.language(&self.profile).into());
        if call.sends_partner_id() {
            body.insert("partnerId".into(), self.profile.partner_id()?.into());
        }
        if let Some(ks) = ks {
            body.insert("ks".into(), ks.into());
        }
        body.extend(extra);
        Ok(Value::Object(body))
    }

    /// Send `call` and decode `result` as `T`, or hand back its fault.
    #[instrument(skip(self, ks, extra), fields(service = call.path().0, action = call.path().1))]
    pub async fn call<T: DeserializeOwned>(
        &self,
        call: OttCall,
        ks: Option<&str>,
        extra: Map<String, Value>,
    ) -> Result<std::result::Result<T, ServerFault>> {
        let (service, action) = call.path();
        let url = self.endpoints.ott_action_url(service, action);
        let body = self.body(call, ks, extra)?;

        let response = self
            .http
            .client()
            .post(&url)
            .query(&[("format", "1"), ("clientTag", self.profile.client_tag.as_str())])
            .json(&body)
            .send()
            .await?;
        let (status, text) = read_body(response).await?;
        debug!(status = status.as_u16(), "OTT response");

        if !status.is_success() {
            return Err(Error::protocol(format!(
                "{service}/{action} returned HTTP {status}"
            )));
        }
        decode_result(service, action, &text)
    }
}

fn decode_result<T: DeserializeOwned>(
    service: &str,
    action: &str,
    text: &str,
) -> Result<std::result::Result<T, ServerFault>> {
    let mut envelope: Value = serde_json::from_str(text).map_err(|e| {
        Error::protocol(format!("{service}/{action} returned invalid JSON: {e}"))
    })?;
    let result = envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| Error::protocol(format!("{service}/{action} response has no result")))?;

    if let Some(error) = result.get("error") {
        let fault = ServerFault::deserialize(error).map_err(|e| {
            Error::protocol(format!("{service}/{action} returned an unreadable error: {e}"))
        })?;
        return Ok(Err(fault));
    }

    serde_json::from_value(result)
        .map(Ok)
        .map_err(|e| Error::protocol(format!("{service}/{action} result is malformed: {e}")))
}

/// Build a JSON object from key/value pairs.
fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
