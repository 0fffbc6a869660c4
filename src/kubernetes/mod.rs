//! Kubernetes backend
//!
//! One connection per kubeconfig context. Resources are served by a single
//! dynamic resourcer over [`DynamicObject`], resource types come from API
//! discovery, and informers are built on `kube::runtime::watcher`.

mod connections;
mod discovery;
mod informer;
mod resourcer;

pub use connections::KubeConnectionManager;
pub use discovery::KubeDiscovery;
pub use informer::{KubeInformerFactory, KubeInformerHandle};
pub use resourcer::KubeResourcer;

use kube::api::{ApiResource, GroupVersionKind};

use crate::error::Error;
use crate::types::{ConnectionStatus, ResourceError, ResourceMeta};

/// Group name used in resource type keys for the legacy core API group
pub const CORE_GROUP: &str = "core";

/// Build the API resource for a resource type, mapping `core` to the empty group
pub fn api_resource(meta: &ResourceMeta) -> ApiResource {
    let group = if meta.group == CORE_GROUP {
        ""
    } else {
        meta.group.as_str()
    };
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, &meta.version, &meta.kind))
}

/// Resource type meta for a discovered API resource
pub fn resource_meta(resource: &ApiResource) -> ResourceMeta {
    let group = if resource.group.is_empty() {
        CORE_GROUP
    } else {
        resource.group.as_str()
    };
    ResourceMeta::new(group, &resource.version, &resource.kind)
}

/// Classify a Kubernetes client error for display
pub fn classify_kube_error(err: &kube::Error) -> ResourceError {
    match err {
        kube::Error::Api(response) => {
            ResourceError::classify(Some(response.code), response.message.clone())
        }
        other => ResourceError::classify(None, other.to_string()),
    }
}

/// Connection status implied by a failed API server probe
pub fn status_from_error(err: &kube::Error) -> ConnectionStatus {
    match err {
        kube::Error::Api(response) => match response.code {
            401 => ConnectionStatus::Unauthorized,
            403 => ConnectionStatus::Forbidden,
            404 => ConnectionStatus::NotFound,
            _ => ConnectionStatus::Error,
        },
        _ => ConnectionStatus::Error,
    }
}

fn backend_error(err: kube::Error) -> Error {
    Error::Resource(classify_kube_error(&err))
}
