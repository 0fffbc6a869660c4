//! Registries consulted when resolving a resource type: which resourcer
//! serves it, and whether the type exists at all.

mod resource_types;
mod resourcers;

pub use resource_types::{ResourceTypeDiscovery, ResourceTypeManager, ResourceTypeRegistry};
pub use resourcers::{ResourcerLookup, ResourcerRegistry};
