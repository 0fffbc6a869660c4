//! Per-request plugin context

use serde::{Deserialize, Serialize};

use super::Connection;

/// Context handed to every controller operation and hook.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    /// Correlates log lines for a single host request
    #[serde(default)]
    pub request_id: String,

    /// Who issued the request (user, system, ...)
    #[serde(default)]
    pub requester: String,

    /// The connection the request targets, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
}

impl PluginContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    /// Context scoped to the given connection
    pub fn for_connection(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
            ..Default::default()
        }
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.id.as_str())
    }
}
