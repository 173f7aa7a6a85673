//! Household device registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use super::{fields, OttCall, OttClient};
use crate::session::error::{AuthError, Error, Result};
use crate::session::model::{DeviceIdentity, ServiceSession};

/// Fault message the service uses for an unknown device.
const DEVICE_NOT_EXISTS: &str = "DeviceNotExists";

/// State reported for a successfully registered device.
const STATE_ACTIVATED: &str = "activated";

/// A device registered in the household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdDevice {
    pub udid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub household_id: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub activated_on: Option<i64>,
}

/// A household device that is currently streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingDevice {
    #[serde(default)]
    pub udid: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub asset: Option<Value>,
}

/// A device brand known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBrand {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_family_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    objects: Vec<T>,
    #[serde(default)]
    total_count: i64,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(default)]
    udid: String,
    #[serde(default)]
    state: Option<String>,
}

impl OttClient {
    /// Device id the current session is bound to.
    ///
    /// Fails with [`AuthError::DeviceNotRegistered`] when the household does
    /// not know the device yet; every other fault is a protocol error.
    #[instrument(skip(self, session))]
    pub async fn get_registered_device_id(&self, session: &ServiceSession) -> Result<String> {
        let device: HouseholdDevice = self
            .call(OttCall::GetDevice, Some(&session.ks_token), Map::new())
            .await?
            .map_err(|fault| {
                if fault.message == DEVICE_NOT_EXISTS {
                    Error::from(AuthError::DeviceNotRegistered)
                } else {
                    Error::protocol(format!(
                        "device lookup failed: {} ({})",
                        fault.message, fault.code
                    ))
                }
            })?;
        Ok(device.udid)
    }

    /// Register `device` in the household. Succeeds only on state `activated`.
    #[instrument(skip(self, session, device), fields(device = %device))]
    pub async fn register_device(
        &self,
        session: &ServiceSession,
        device: &DeviceIdentity,
    ) -> Result<String> {
        let brand_id: Value = match self.profile().device_brand.parse::<i64>() {
            Ok(id) => id.into(),
            Err(_) => self.profile().device_brand.clone().into(),
        };
        let extra = fields([(
            "device",
            json!({
                "objectType": format!("{}HouseholdDevice", self.endpoints().platform_name),
                "udid": device.as_str(),
                "name": self.profile().device_name,
                "brandId": brand_id,
            }),
        )]);

        let response = match self
            .call::<AddResponse>(OttCall::AddDevice, Some(&session.ks_token), extra)
            .await?
        {
            Ok(response) => response,
            Err(fault) => {
                warn!(code = fault.code, "device registration rejected");
                return Err(AuthError::AddHouseholdDevice {
                    message: fault.message,
                }
                .into());
            }
        };

        if response.state.as_deref() == Some(STATE_ACTIVATED) {
            info!(udid = %response.udid, "device registered");
            return Ok(response.udid);
        }

        let state = response.state.as_deref().unwrap_or("unknown");
        warn!(state, "device registration did not activate");
        Err(AuthError::AddHouseholdDevice {
            message: format!("device state is '{state}'"),
        }
        .into())
    }

    /// Remove a device from the household.
    #[instrument(skip(self, session))]
    pub async fn delete_device(&self, session: &ServiceSession, device_id: &str) -> Result<()> {
        let removed: bool = self
            .call(
                OttCall::DeleteDevice,
                Some(&session.ks_token),
                fields([("udid", device_id.into())]),
            )
            .await?
            .map_err(|fault| AuthError::DeviceDeletionFailed {
                message: fault.message,
                code: fault.code,
            })?;

        if removed {
            info!("device removed from household");
            Ok(())
        } else {
            Err(AuthError::DeviceDeletionFailed {
                message: "the service declined to remove the device".into(),
                code: 0,
            }
            .into())
        }
    }

    /// Devices registered in the household.
    #[instrument(skip(self, session))]
    pub async fn list_devices(&self, session: &ServiceSession) -> Result<Vec<HouseholdDevice>> {
        self.list(OttCall::ListDevices, session).await
    }

    /// Household devices currently streaming.
    #[instrument(skip(self, session))]
    pub async fn streaming_devices(
        &self,
        session: &ServiceSession,
    ) -> Result<Vec<StreamingDevice>> {
        self.list(OttCall::ListStreamingDevices, session).await
    }

    /// Device brands known to the service.
    #[instrument(skip(self, session))]
    pub async fn device_brands(&self, session: &ServiceSession) -> Result<Vec<DeviceBrand>> {
        self.list(OttCall::ListDeviceBrands, session).await
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        call: OttCall,
        session: &ServiceSession,
    ) -> Result<Vec<T>> {
        let response: ListResponse<T> = self
            .call(call, Some(&session.ks_token), Map::new())
            .await?
            .map_err(|fault| {
                Error::protocol(format!("listing failed: {} ({})", fault.message, fault.code))
            })?;
        tracing::debug!(
            returned = response.objects.len(),
            total = response.total_count,
            "list fetched"
        );
        Ok(response.objects)
    }
}
