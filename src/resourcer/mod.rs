//! Resourcer strategies
//!
//! A [`Resourcer`] implements the CRUD operations for one resource type
//! against a backend client `C`. It holds no connection state: the
//! connection-scoped client is injected on every call.
//!
//! A [`DynamicResourcer`] serves resource types that are not known ahead of
//! time (custom resources and other discovered types) and therefore receives
//! the resolved [`ResourceMeta`] alongside the client.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CreateInput, CreateResult, DeleteInput, DeleteResult, FindInput, FindResult, GetInput,
    GetResult, ListInput, ListResult, PluginContext, ResourceMeta, UpdateInput, UpdateResult,
};

/// CRUD strategy for a statically registered resource type
#[async_trait]
pub trait Resourcer<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn get(&self, ctx: &PluginContext, client: &C, input: GetInput) -> Result<GetResult>;

    async fn list(&self, ctx: &PluginContext, client: &C, input: ListInput) -> Result<ListResult>;

    async fn find(&self, ctx: &PluginContext, client: &C, input: FindInput) -> Result<FindResult>;

    async fn create(
        &self,
        ctx: &PluginContext,
        client: &C,
        input: CreateInput,
    ) -> Result<CreateResult>;

    async fn update(
        &self,
        ctx: &PluginContext,
        client: &C,
        input: UpdateInput,
    ) -> Result<UpdateResult>;

    async fn delete(
        &self,
        ctx: &PluginContext,
        client: &C,
        input: DeleteInput,
    ) -> Result<DeleteResult>;
}

/// CRUD strategy for resource types resolved at call time
#[async_trait]
pub trait DynamicResourcer<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn get(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: GetInput,
    ) -> Result<GetResult>;

    async fn list(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: ListInput,
    ) -> Result<ListResult>;

    async fn find(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: FindInput,
    ) -> Result<FindResult>;

    async fn create(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: CreateInput,
    ) -> Result<CreateResult>;

    async fn update(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: UpdateInput,
    ) -> Result<UpdateResult>;

    async fn delete(
        &self,
        ctx: &PluginContext,
        client: &C,
        meta: &ResourceMeta,
        input: DeleteInput,
    ) -> Result<DeleteResult>;
}
