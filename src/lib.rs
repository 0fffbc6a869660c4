//! Plugin Resource Runtime
//!
//! Serves CRUD operations over backend resources (Kubernetes objects, cloud
//! resources, ...) behind a single controller. Resource types are resolved to
//! a static or dynamic resourcer, wrapped in a six-phase hook pipeline, and
//! executed with the client of the caller's connection. Per-connection
//! informers stream add/update/delete events back to the host.

pub mod config;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod informer;
pub mod kubernetes;
pub mod metrics;
pub mod registry;
pub mod resourcer;
pub mod types;

pub use controller::{ConnectionManager, ControllerBuilder, ResourceController};
pub use error::{Error, Result};
