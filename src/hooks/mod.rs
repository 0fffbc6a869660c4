//! Lifecycle hook pipeline
//!
//! Hooks are stored per operation kind, indexed by phase and selector, and
//! returned in registration order. Execution order is fixed:
//!
//! ```text
//! PreMutation → PreValidation → BeforeOperation → (operation)
//!     → AfterOperation → PostValidation → PostMutation
//! ```
//!
//! The first failing hook aborts the operation. When a pre-operation hook
//! fails, the backend is never called.

mod manager;
mod types;

pub use manager::{HookManager, OperationHooks};
pub use types::{Hook, HookSet, HookType, PostHook, PreHook, ALL_RESOURCES};
