//! Data types shared by the registry, hook pipeline, informers and controller

mod connection;
mod context;
mod events;
mod meta;
mod operations;
mod resource_error;

pub use connection::*;
pub use context::*;
pub use events::*;
pub use meta::*;
pub use operations::*;
pub use resource_error::*;
