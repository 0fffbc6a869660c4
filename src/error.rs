//! Error types for the resource runtime

use thiserror::Error;

use crate::hooks::HookType;
use crate::types::{Operation, ResourceError};

/// Result type alias using the runtime's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime error types
#[derive(Error, Debug)]
pub enum Error {
    /// A static resourcer is already registered for the key
    #[error("resourcer for resource type '{0}' already exists")]
    ResourcerExists(String),

    /// No static resourcer is registered for the key
    #[error("resourcer for resource type '{0}' does not exist")]
    ResourcerNotFound(String),

    /// A hook with the same id is already registered under a selector
    #[error("hook '{hook}' already exists for selector '{selector}' in phase {phase}")]
    HookExists {
        hook: String,
        selector: String,
        phase: HookType,
    },

    /// Hook definition is unusable
    #[error("invalid hook '{hook}': {reason}")]
    InvalidHook { hook: String, reason: String },

    /// A hook rejected the operation
    #[error("{phase} hook '{hook}' failed: {message}")]
    Hook {
        phase: HookType,
        hook: String,
        message: String,
    },

    /// Resource type is unknown and no dynamic fallback exists
    #[error("resource type '{0}' not found")]
    ResourceTypeNotFound(String),

    /// Resource type is known but nothing can serve it
    #[error("no resourcer available for resource type '{0}'")]
    NoResourcer(String),

    /// Malformed `group::version::kind` key
    #[error("invalid resource type key '{0}': expected group::version::kind")]
    InvalidResourceKey(String),

    /// The plugin context carries no connection
    #[error("no connection set on the plugin context")]
    MissingConnection,

    /// Connection unknown to the connection manager
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    /// Connection exists but has no live client
    #[error("connection '{0}' is not started")]
    ConnectionNotStarted(String),

    /// Connection client could not be obtained
    #[error("client unavailable for connection '{connection}': {source}")]
    ClientUnavailable {
        connection: String,
        #[source]
        source: Box<Error>,
    },

    /// An informer already exists for the connection
    #[error("informer for connection '{0}' already exists")]
    InformerExists(String),

    /// No informer exists for the connection
    #[error("informer for connection '{0}' not found")]
    InformerNotFound(String),

    /// The fan-in loop is already running
    #[error("informer manager is already running")]
    InformerAlreadyRunning,

    /// The host stopped draining an event channel
    #[error("host {0} event channel closed")]
    EventChannelClosed(&'static str),

    /// A resource operation failed
    #[error("{operation} '{key}' failed: {source}")]
    Operation {
        operation: Operation,
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// Classified backend error
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig loading error
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid hook error
    pub fn invalid_hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidHook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error with the operation and resource type it occurred in
    pub fn operation(operation: Operation, key: impl Into<String>, source: Error) -> Self {
        Error::Operation {
            operation,
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// The error beneath any operation wrappers
    pub fn cause(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.cause(),
            other => other,
        }
    }

    /// The classified backend error, if this error carries one
    pub fn resource_error(&self) -> Option<&ResourceError> {
        match self {
            Error::Resource(e) => Some(e),
            Error::Operation { source, .. } | Error::ClientUnavailable { source, .. } => {
                source.resource_error()
            }
            _ => None,
        }
    }
}
