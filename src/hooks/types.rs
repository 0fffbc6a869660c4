//! Hook definitions and the per-selector hook set

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::PluginContext;

/// Selector that applies a hook to every resource type
pub const ALL_RESOURCES: &str = "*";

/// The six points in an operation's lifecycle where hooks run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    PreMutation,
    PreValidation,
    BeforeOperation,
    AfterOperation,
    PostValidation,
    PostMutation,
}

impl HookType {
    /// Phases that run before the resource operation, in execution order
    pub const PRE: [HookType; 3] = [
        HookType::PreMutation,
        HookType::PreValidation,
        HookType::BeforeOperation,
    ];

    /// Phases that run after the resource operation, in execution order
    pub const POST: [HookType; 3] = [
        HookType::AfterOperation,
        HookType::PostValidation,
        HookType::PostMutation,
    ];

    pub fn is_pre(&self) -> bool {
        Self::PRE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PreMutation => "PreMutation",
            HookType::PreValidation => "PreValidation",
            HookType::BeforeOperation => "BeforeOperation",
            HookType::AfterOperation => "AfterOperation",
            HookType::PostValidation => "PostValidation",
            HookType::PostMutation => "PostMutation",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type HookFn<T> = Arc<dyn Fn(&PluginContext, &mut T) -> Result<()> + Send + Sync>;

/// Extension code run at one phase of an operation.
///
/// `T` is the operation input for pre phases and the operation result for
/// post phases. The same hook may be registered under several selectors.
pub struct Hook<T> {
    pub id: String,
    pub hook_type: HookType,
    pub selectors: Vec<String>,
    execute: HookFn<T>,
}

/// Hook running before the resource operation, over its input
pub type PreHook<I> = Hook<I>;

/// Hook running after the resource operation, over its result
pub type PostHook<O> = Hook<O>;

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            hook_type: self.hook_type,
            selectors: self.selectors.clone(),
            execute: self.execute.clone(),
        }
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.id)
            .field("hook_type", &self.hook_type)
            .field("selectors", &self.selectors)
            .finish_non_exhaustive()
    }
}

impl<T> Hook<T> {
    pub fn new<F>(
        id: impl Into<String>,
        hook_type: HookType,
        selectors: impl IntoIterator<Item = impl Into<String>>,
        execute: F,
    ) -> Self
    where
        F: Fn(&PluginContext, &mut T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            hook_type,
            selectors: selectors.into_iter().map(Into::into).collect(),
            execute: Arc::new(execute),
        }
    }

    /// Run the hook, attributing any failure to this hook and its phase
    pub fn execute(&self, ctx: &PluginContext, target: &mut T) -> Result<()> {
        (self.execute)(ctx, target).map_err(|e| match e {
            hook_error @ Error::Hook { .. } => hook_error,
            other => Error::Hook {
                phase: self.hook_type,
                hook: self.id.clone(),
                message: other.to_string(),
            },
        })
    }
}

/// All hooks for one selector of one operation kind, grouped by phase
pub struct HookSet<I, O> {
    pub pre_mutation: Vec<PreHook<I>>,
    pub pre_validation: Vec<PreHook<I>>,
    pub before_operation: Vec<PreHook<I>>,
    pub after_operation: Vec<PostHook<O>>,
    pub post_validation: Vec<PostHook<O>>,
    pub post_mutation: Vec<PostHook<O>>,
}

impl<I, O> Default for HookSet<I, O> {
    fn default() -> Self {
        Self {
            pre_mutation: Vec::new(),
            pre_validation: Vec::new(),
            before_operation: Vec::new(),
            after_operation: Vec::new(),
            post_validation: Vec::new(),
            post_mutation: Vec::new(),
        }
    }
}

impl<I, O> HookSet<I, O> {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.pre_mutation.len()
            + self.pre_validation.len()
            + self.before_operation.len()
            + self.after_operation.len()
            + self.post_validation.len()
            + self.post_mutation.len()
    }

    /// Append `other`'s hooks after this set's hooks, phase by phase
    pub fn merge(mut self, other: HookSet<I, O>) -> Self {
        self.pre_mutation.extend(other.pre_mutation);
        self.pre_validation.extend(other.pre_validation);
        self.before_operation.extend(other.before_operation);
        self.after_operation.extend(other.after_operation);
        self.post_validation.extend(other.post_validation);
        self.post_mutation.extend(other.post_mutation);
        self
    }

    /// Run PreMutation, PreValidation then BeforeOperation hooks over the
    /// input. Stops at the first failure.
    pub fn run_pre(&self, ctx: &PluginContext, input: &mut I) -> Result<()> {
        self.pre_mutation
            .iter()
            .chain(&self.pre_validation)
            .chain(&self.before_operation)
            .try_for_each(|hook| hook.execute(ctx, input))
    }

    /// Run AfterOperation, PostValidation then PostMutation hooks over the
    /// result. Stops at the first failure.
    pub fn run_post(&self, ctx: &PluginContext, output: &mut O) -> Result<()> {
        self.after_operation
            .iter()
            .chain(&self.post_validation)
            .chain(&self.post_mutation)
            .try_for_each(|hook| hook.execute(ctx, output))
    }
}
