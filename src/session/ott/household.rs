//! Household lookup.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::{OttCall, OttClient};
use crate::session::error::{Error, Result};
use crate::session::model::{HouseholdBinding, ServiceSession};

/// Reported when the service omits an id.
const UNKNOWN_ID: i64 = -1;

#[derive(Debug, Deserialize)]
struct Household {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    users: Vec<HouseholdUser>,
}

#[derive(Debug, Deserialize)]
struct HouseholdUser {
    #[serde(default)]
    id: Option<Value>,
}

impl OttClient {
    /// Household and first user id of the escalated session.
    #[instrument(skip(self, session))]
    pub async fn household(&self, session: &ServiceSession) -> Result<HouseholdBinding> {
        let household: Household = self
            .call(OttCall::GetHousehold, Some(&session.ks_token), Map::new())
            .await?
            .map_err(|fault| {
                Error::protocol(format!(
                    "household lookup failed: {} ({})",
                    fault.message, fault.code
                ))
            })?;

        let user_id = household
            .users
            .iter()
            .find_map(|user| match &user.id {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| UNKNOWN_ID.to_string());

        let binding = HouseholdBinding {
            household_id: household.id.unwrap_or(UNKNOWN_ID),
            user_id,
        };
        info!(household_id = binding.household_id, "household resolved");
        Ok(binding)
    }
}
