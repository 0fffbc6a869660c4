//! Dynamic resourcer over `DynamicObject`

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::TypeMeta;
use kube::Client;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{api_resource, backend_error};
use crate::error::Result;
use crate::resourcer::DynamicResourcer;
use crate::types::{
    order_items, CreateInput, CreateResult, DeleteInput, DeleteResult, FindInput, FindResult,
    GetInput, GetResult, ListInput, ListResult, OperationResult, OrderParams, PaginationParams,
    PluginContext, ResourceMeta, UpdateInput, UpdateResult,
};

/// Query parameter passed through as a field selector on find
pub const FIELD_SELECTOR_PARAM: &str = "fieldSelector";
/// Query parameter merged into the label selector built from conditions
pub const LABEL_SELECTOR_PARAM: &str = "labelSelector";

/// Serves any resource type the API server knows about.
///
/// An empty namespace addresses the resource cluster-wide (or across all
/// namespaces for a list).
#[derive(Clone, Debug, Default)]
pub struct KubeResourcer;

impl KubeResourcer {
    pub fn new() -> Self {
        Self
    }

    fn api(client: &Client, meta: &ResourceMeta, namespace: &str) -> Api<DynamicObject> {
        let resource = api_resource(meta);
        if namespace.is_empty() {
            Api::all_with(client.clone(), &resource)
        } else {
            Api::namespaced_with(client.clone(), namespace, &resource)
        }
    }

    /// List across `namespaces` (all namespaces when empty), then order and page
    async fn list_in(
        client: &Client,
        meta: &ResourceMeta,
        namespaces: &[String],
        params: &ListParams,
        order: Option<&OrderParams>,
        pagination: PaginationParams,
    ) -> Result<ListResult> {
        let all = [String::new()];
        let namespaces = if namespaces.is_empty() {
            &all[..]
        } else {
            namespaces
        };

        let mut items = Vec::new();
        for namespace in namespaces {
            let list = Self::api(client, meta, namespace)
                .list(params)
                .await
                .map_err(backend_error)?;
            for object in list.items {
                items.push(serde_json::to_value(object)?);
            }
        }

        if let Some(order) = order {
            order_items(&mut items, order);
        }
        Ok(ListResult::paged(items, pagination))
    }

    /// Parse the request body into an object of the resolved type, filling in
    /// the type meta and namespace when the caller left them out
    fn object(meta: &ResourceMeta, input: Value, namespace: &str) -> Result<DynamicObject> {
        let mut object: DynamicObject = serde_json::from_value(input)?;
        if object.types.is_none() {
            let resource = api_resource(meta);
            object.types = Some(TypeMeta {
                api_version: resource.api_version,
                kind: resource.kind,
            });
        }
        if !namespace.is_empty() && object.metadata.namespace.is_none() {
            object.metadata.namespace = Some(namespace.to_string());
        }
        Ok(object)
    }
}

/// Label selector from equality conditions plus an explicit selector param
fn label_selector(conditions: &Map<String, Value>, params: &Map<String, Value>) -> String {
    let mut terms: Vec<String> = conditions
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect();
    if let Some(Value::String(extra)) = params.get(LABEL_SELECTOR_PARAM) {
        if !extra.is_empty() {
            terms.push(extra.clone());
        }
    }
    terms.join(",")
}

#[async_trait]
impl DynamicResourcer<Client> for KubeResourcer {
    #[instrument(skip(self, _ctx, client, meta), fields(key = %meta))]
    async fn get(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: GetInput,
    ) -> Result<GetResult> {
        let object = Self::api(client, meta, &input.namespace)
            .get(&input.id)
            .await
            .map_err(backend_error)?;
        Ok(OperationResult::ok(serde_json::to_value(object)?))
    }

    #[instrument(skip(self, _ctx, client, meta, input), fields(key = %meta))]
    async fn list(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: ListInput,
    ) -> Result<ListResult> {
        Self::list_in(
            client,
            meta,
            &input.namespaces,
            &ListParams::default(),
            input.order.as_ref(),
            input.pagination,
        )
        .await
    }

    #[instrument(skip(self, _ctx, client, meta, input), fields(key = %meta))]
    async fn find(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: FindInput,
    ) -> Result<FindResult> {
        let mut params = ListParams::default();
        let labels = label_selector(&input.conditions, &input.params);
        if !labels.is_empty() {
            params = params.labels(&labels);
        }
        if let Some(Value::String(fields)) = input.params.get(FIELD_SELECTOR_PARAM) {
            params = params.fields(fields);
        }
        debug!(labels = %labels, "Finding resources");

        Self::list_in(
            client,
            meta,
            &input.namespaces,
            &params,
            input.order.as_ref(),
            input.pagination,
        )
        .await
    }

    #[instrument(skip(self, _ctx, client, meta, input), fields(key = %meta))]
    async fn create(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: CreateInput,
    ) -> Result<CreateResult> {
        let object = Self::object(meta, input.input, &input.namespace)?;
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let created = Self::api(client, meta, &namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(backend_error)?;
        Ok(OperationResult::ok(serde_json::to_value(created)?))
    }

    #[instrument(skip(self, _ctx, client, meta, input), fields(key = %meta))]
    async fn update(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: UpdateInput,
    ) -> Result<UpdateResult> {
        let mut object = Self::object(meta, input.input, &input.namespace)?;
        if object.metadata.name.is_none() {
            object.metadata.name = Some(input.id.clone());
        }
        let updated = Self::api(client, meta, &input.namespace)
            .replace(&input.id, &PostParams::default(), &object)
            .await
            .map_err(backend_error)?;
        Ok(OperationResult::ok(serde_json::to_value(updated)?))
    }

    #[instrument(skip(self, _ctx, client, meta), fields(key = %meta))]
    async fn delete(
        &self,
        _ctx: &PluginContext,
        client: &Client,
        meta: &ResourceMeta,
        input: DeleteInput,
    ) -> Result<DeleteResult> {
        let params = DeleteParams {
            grace_period_seconds: input.grace_period_seconds,
            ..Default::default()
        };
        let deleted = Self::api(client, meta, &input.namespace)
            .delete(&input.id, &params)
            .await
            .map_err(backend_error)?;
        // The API server returns the object while finalizers run and a bare
        // status once it is gone
        let result = match deleted.left() {
            Some(object) => serde_json::to_value(object)?,
            None => Value::Null,
        };
        Ok(OperationResult::ok(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_joins_conditions_and_param() {
        let conditions = json!({ "app": "web", "replicas": 3 });
        let params = json!({ "labelSelector": "tier in (frontend)" });
        let selector = label_selector(
            conditions.as_object().unwrap(),
            params.as_object().unwrap(),
        );
        assert_eq!(selector, "app=web,replicas=3,tier in (frontend)");
    }

    #[test]
    fn object_fills_in_type_and_namespace() {
        let meta = ResourceMeta::new("apps", "v1", "Deployment");
        let object = KubeResourcer::object(
            &meta,
            json!({ "metadata": { "name": "web" }, "spec": { "replicas": 1 } }),
            "default",
        )
        .unwrap();

        let types = object.types.unwrap();
        assert_eq!(types.api_version, "apps/v1");
        assert_eq!(types.kind, "Deployment");
        assert_eq!(object.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(object.data["spec"]["replicas"], 1);
    }

    #[test]
    fn explicit_namespace_in_body_wins() {
        let meta = ResourceMeta::new("core", "v1", "ConfigMap");
        let object = KubeResourcer::object(
            &meta,
            json!({ "metadata": { "name": "cfg", "namespace": "kube-system" } }),
            "default",
        )
        .unwrap();
        assert_eq!(object.metadata.namespace.as_deref(), Some("kube-system"));
        assert_eq!(object.types.unwrap().api_version, "v1");
    }
}
