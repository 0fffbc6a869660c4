//! Informer event payloads delivered to the host

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource appeared in a connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformerAddPayload {
    /// Resource type key
    pub key: String,
    pub connection_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub namespace: String,
    pub data: Value,
}

/// A resource changed in a connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformerUpdatePayload {
    pub key: String,
    pub connection_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub namespace: String,
    pub old_data: Value,
    pub new_data: Value,
}

/// A resource was removed from a connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformerDeletePayload {
    pub key: String,
    pub connection_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub namespace: String,
    pub data: Value,
}
