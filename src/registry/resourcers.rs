//! Resource type key → resourcer registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resourcer::{DynamicResourcer, Resourcer};
use crate::types::{selector_matches, ResourceMeta};

/// Outcome of resolving a resource type key against the registry
pub enum ResourcerLookup<C>
where
    C: Send + Sync + 'static,
{
    /// A resourcer registered for exactly this key
    Static(Arc<dyn Resourcer<C>>),
    /// The first dynamic fallback whose pattern matches the key
    Dynamic(Arc<dyn DynamicResourcer<C>>),
    NotFound,
}

struct StaticEntry<C>
where
    C: Send + Sync + 'static,
{
    meta: ResourceMeta,
    resourcer: Arc<dyn Resourcer<C>>,
}

struct DynamicEntry<C>
where
    C: Send + Sync + 'static,
{
    pattern: String,
    resourcer: Arc<dyn DynamicResourcer<C>>,
}

struct Inner<C>
where
    C: Send + Sync + 'static,
{
    resourcers: HashMap<String, StaticEntry<C>>,
    dynamic: Vec<DynamicEntry<C>>,
}

/// Registry of static resourcers plus ordered dynamic fallbacks.
///
/// Reads dominate (every dispatched operation performs a lookup) and writes
/// only happen while a backend registers itself, so a single read/write lock
/// guards the whole registry.
pub struct ResourcerRegistry<C>
where
    C: Send + Sync + 'static,
{
    inner: RwLock<Inner<C>>,
}

impl<C> Default for ResourcerRegistry<C>
where
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                resourcers: HashMap::new(),
                dynamic: Vec::new(),
            }),
        }
    }
}

impl<C> ResourcerRegistry<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resourcer for `key`. Fails if the key is already taken.
    pub fn register_resourcer(&self, key: &str, resourcer: Arc<dyn Resourcer<C>>) -> Result<()> {
        let meta = ResourceMeta::from_key(key)?;
        self.register_resourcers_from_map([(meta, resourcer)])
    }

    /// Register many resourcers in iteration order.
    ///
    /// Stops at the first key that is already registered and returns its
    /// error. Entries registered before the conflict stay registered.
    pub fn register_resourcers_from_map<I>(&self, resourcers: I) -> Result<()>
    where
        I: IntoIterator<Item = (ResourceMeta, Arc<dyn Resourcer<C>>)>,
    {
        let mut inner = self.inner.write();
        for (meta, resourcer) in resourcers {
            let key = meta.key();
            if inner.resourcers.contains_key(&key) {
                return Err(Error::ResourcerExists(key));
            }
            debug!(key = %key, "Registered resourcer");
            inner.resourcers.insert(key, StaticEntry { meta, resourcer });
        }
        Ok(())
    }

    pub fn deregister_resourcer(&self, key: &str) -> Result<()> {
        self.inner
            .write()
            .resourcers
            .remove(key)
            .map(|_| debug!(key = %key, "Deregistered resourcer"))
            .ok_or_else(|| Error::ResourcerNotFound(key.to_string()))
    }

    pub fn get_resourcer(&self, key: &str) -> Result<Arc<dyn Resourcer<C>>> {
        self.inner
            .read()
            .resourcers
            .get(key)
            .map(|entry| entry.resourcer.clone())
            .ok_or_else(|| Error::ResourcerNotFound(key.to_string()))
    }

    /// Register a fallback for keys matching `pattern` (`*`, `group::*::*`, ...).
    /// Patterns are tried in registration order.
    pub fn register_dynamic_resourcer(
        &self,
        pattern: impl Into<String>,
        resourcer: Arc<dyn DynamicResourcer<C>>,
    ) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "Registered dynamic resourcer");
        self.inner.write().dynamic.push(DynamicEntry { pattern, resourcer });
    }

    pub fn has_dynamic_resourcers(&self) -> bool {
        !self.inner.read().dynamic.is_empty()
    }

    pub fn get_dynamic_resourcer(&self, key: &str) -> Result<Arc<dyn DynamicResourcer<C>>> {
        self.inner
            .read()
            .dynamic
            .iter()
            .find(|entry| selector_matches(&entry.pattern, key))
            .map(|entry| entry.resourcer.clone())
            .ok_or_else(|| Error::NoResourcer(key.to_string()))
    }

    /// Resolve `key`: a static registration wins over any dynamic fallback
    pub fn lookup(&self, key: &str) -> ResourcerLookup<C> {
        let inner = self.inner.read();
        if let Some(entry) = inner.resourcers.get(key) {
            return ResourcerLookup::Static(entry.resourcer.clone());
        }
        inner
            .dynamic
            .iter()
            .find(|entry| selector_matches(&entry.pattern, key))
            .map(|entry| ResourcerLookup::Dynamic(entry.resourcer.clone()))
            .unwrap_or(ResourcerLookup::NotFound)
    }

    /// Metas of every statically registered resource type
    pub fn resource_metas(&self) -> Vec<ResourceMeta> {
        self.inner
            .read()
            .resourcers
            .values()
            .map(|entry| entry.meta.clone())
            .collect()
    }
}
