use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single edit operation as exchanged with clients.
///
/// The payload is opaque to the gateway. `version` is assigned by storage
/// when the operation is appended and is absent on operations a client sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

impl Operation {
    #[cfg(test)]
    pub fn new(id: &str, payload: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            version: None,
            payload,
        }
    }
}
