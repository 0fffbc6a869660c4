//! Selector-indexed hook storage

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use super::types::{Hook, HookSet, HookType, PostHook, PreHook};
use crate::error::{Error, Result};
use crate::types::{
    CreateInput, CreateResult, DeleteInput, DeleteResult, FindInput, FindResult, GetInput,
    GetResult, ListInput, ListResult, UpdateInput, UpdateResult,
};

/// phase → selector → hooks in registration order
type PhaseIndex<T> = HashMap<HookType, HashMap<String, Vec<Hook<T>>>>;

/// Hook index for a single operation kind
pub struct OperationHooks<I, O> {
    pre: RwLock<PhaseIndex<I>>,
    post: RwLock<PhaseIndex<O>>,
}

impl<I, O> Default for OperationHooks<I, O> {
    fn default() -> Self {
        Self {
            pre: RwLock::new(HashMap::new()),
            post: RwLock::new(HashMap::new()),
        }
    }
}

impl<I, O> OperationHooks<I, O> {
    /// Register a hook for one of the pre-operation phases
    pub fn register_pre_hook(&self, hook: PreHook<I>) -> Result<()> {
        if !hook.hook_type.is_pre() {
            return Err(Error::invalid_hook(
                &hook.id,
                format!("{} is not a pre-operation phase", hook.hook_type),
            ));
        }
        insert(&self.pre, hook)
    }

    /// Register a hook for one of the post-operation phases
    pub fn register_post_hook(&self, hook: PostHook<O>) -> Result<()> {
        if hook.hook_type.is_pre() {
            return Err(Error::invalid_hook(
                &hook.id,
                format!("{} is not a post-operation phase", hook.hook_type),
            ));
        }
        insert(&self.post, hook)
    }

    /// All six phase lists registered under exactly `selector`
    pub fn hooks_for(&self, selector: &str) -> HookSet<I, O> {
        let pre = self.pre.read();
        let post = self.post.read();
        HookSet {
            pre_mutation: bucket(&pre, HookType::PreMutation, selector),
            pre_validation: bucket(&pre, HookType::PreValidation, selector),
            before_operation: bucket(&pre, HookType::BeforeOperation, selector),
            after_operation: bucket(&post, HookType::AfterOperation, selector),
            post_validation: bucket(&post, HookType::PostValidation, selector),
            post_mutation: bucket(&post, HookType::PostMutation, selector),
        }
    }
}

fn insert<T>(index: &RwLock<PhaseIndex<T>>, hook: Hook<T>) -> Result<()> {
    if hook.selectors.is_empty() {
        return Err(Error::invalid_hook(&hook.id, "hook has no selectors"));
    }

    let mut index = index.write();
    let phase = index.entry(hook.hook_type).or_default();

    // Validate every selector before touching the index
    if let Some(selector) = hook.selectors.iter().find(|selector| {
        phase
            .get(selector.as_str())
            .is_some_and(|hooks| hooks.iter().any(|h| h.id == hook.id))
    }) {
        return Err(Error::HookExists {
            hook: hook.id.clone(),
            selector: selector.clone(),
            phase: hook.hook_type,
        });
    }

    let mut seen = HashSet::new();
    for selector in &hook.selectors {
        if seen.insert(selector.as_str()) {
            phase.entry(selector.clone()).or_default().push(hook.clone());
        }
    }

    debug!(
        hook = %hook.id,
        phase = %hook.hook_type,
        selectors = ?hook.selectors,
        "Registered hook"
    );
    Ok(())
}

fn bucket<T>(index: &PhaseIndex<T>, phase: HookType, selector: &str) -> Vec<Hook<T>> {
    index
        .get(&phase)
        .and_then(|selectors| selectors.get(selector))
        .cloned()
        .unwrap_or_default()
}

/// Hook indices for all six resource operations
#[derive(Default)]
pub struct HookManager {
    get: OperationHooks<GetInput, GetResult>,
    list: OperationHooks<ListInput, ListResult>,
    find: OperationHooks<FindInput, FindResult>,
    create: OperationHooks<CreateInput, CreateResult>,
    update: OperationHooks<UpdateInput, UpdateResult>,
    delete: OperationHooks<DeleteInput, DeleteResult>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &OperationHooks<GetInput, GetResult> {
        &self.get
    }

    pub fn list(&self) -> &OperationHooks<ListInput, ListResult> {
        &self.list
    }

    pub fn find(&self) -> &OperationHooks<FindInput, FindResult> {
        &self.find
    }

    pub fn create(&self) -> &OperationHooks<CreateInput, CreateResult> {
        &self.create
    }

    pub fn update(&self) -> &OperationHooks<UpdateInput, UpdateResult> {
        &self.update
    }

    pub fn delete(&self) -> &OperationHooks<DeleteInput, DeleteResult> {
        &self.delete
    }

    pub fn hooks_for_get(&self, selector: &str) -> HookSet<GetInput, GetResult> {
        self.get.hooks_for(selector)
    }

    pub fn hooks_for_list(&self, selector: &str) -> HookSet<ListInput, ListResult> {
        self.list.hooks_for(selector)
    }

    pub fn hooks_for_find(&self, selector: &str) -> HookSet<FindInput, FindResult> {
        self.find.hooks_for(selector)
    }

    pub fn hooks_for_create(&self, selector: &str) -> HookSet<CreateInput, CreateResult> {
        self.create.hooks_for(selector)
    }

    pub fn hooks_for_update(&self, selector: &str) -> HookSet<UpdateInput, UpdateResult> {
        self.update.hooks_for(selector)
    }

    pub fn hooks_for_delete(&self, selector: &str) -> HookSet<DeleteInput, DeleteResult> {
        self.delete.hooks_for(selector)
    }
}
