use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Operation;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub ops: Vec<Operation>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GetSinceRequest {
    pub version: u64,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Long poll interval; only honoured by the polling exchange.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(default)]
    pub version: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "append")]
    Append(AppendRequest),
    #[serde(rename = "getSince")]
    GetSince(GetSinceRequest),
    #[serde(rename = "subscribe")]
    Subscribe(SubscribeRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpsMessage {
    pub ops: Vec<Operation>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    pub ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ops")]
    Ops(OpsMessage),
    #[serde(rename = "ack")]
    Ack(AckMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

/// Body returned by a single polling exchange
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub ops: Vec<Operation>,
    pub error: Option<String>,
}

impl PollResponse {
    pub fn ops(ops: Vec<Operation>) -> Self {
        Self { ops, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ops: Vec::new(),
            error: Some(message.into()),
        }
    }
}
