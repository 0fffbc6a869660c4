//! Operation inputs and result envelopes

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ResourceError;

/// The six resource operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Find,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Find => "find",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested page; `page` is 1-based and a `page_size` of 0 means "everything"
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

/// Pagination metadata returned with list-style results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderParams {
    /// Field path to order by
    pub by: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInput {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInput {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderParams>,
    #[serde(default)]
    pub pagination: PaginationParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindInput {
    /// Equality conditions on resource fields
    #[serde(default)]
    pub conditions: Map<String, Value>,
    /// Backend-specific query parameters
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderParams>,
    #[serde(default)]
    pub pagination: PaginationParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInput {
    pub input: Value,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    pub input: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInput {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u32>,
}

/// Envelope returned by single-resource operations
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub result: Value,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ResourceError>,
}

impl OperationResult {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(error: ResourceError) -> Self {
        Self {
            result: Value::Null,
            success: false,
            errors: vec![error],
        }
    }
}

pub type GetResult = OperationResult;
pub type CreateResult = OperationResult;
pub type UpdateResult = OperationResult;
pub type DeleteResult = OperationResult;

/// Envelope returned by list-style operations
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub result: Vec<Value>,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ResourceError>,
    #[serde(default)]
    pub pagination: PaginationResult,
}

impl ListResult {
    /// Successful result holding the requested page of `items`
    pub fn paged(items: Vec<Value>, params: PaginationParams) -> Self {
        let (result, pagination) = paginate(items, params);
        Self {
            result,
            success: true,
            errors: Vec::new(),
            pagination,
        }
    }
}

pub type FindResult = ListResult;

/// Slice `items` to the requested page and compute the page metadata.
///
/// A zero page size returns every item as a single page. Pages past the end
/// yield no items but still report the true totals.
pub fn paginate(items: Vec<Value>, params: PaginationParams) -> (Vec<Value>, PaginationResult) {
    let total = items.len();
    if params.page_size == 0 {
        return (
            items,
            PaginationResult {
                page: 1,
                page_size: total,
                total,
                pages: 1,
            },
        );
    }

    let page = params.page.max(1);
    let pages = total.div_ceil(params.page_size).max(1);
    let start = (page - 1).saturating_mul(params.page_size);
    let page_items = items
        .into_iter()
        .skip(start)
        .take(params.page_size)
        .collect();

    (
        page_items,
        PaginationResult {
            page,
            page_size: params.page_size,
            total,
            pages,
        },
    )
}

/// Sort `items` by the dotted field path in `order` (e.g. `metadata.name`).
///
/// Strings compare lexically and numbers numerically. Items missing the field
/// sort after those that have it, in either direction.
pub fn order_items(items: &mut [Value], order: &OrderParams) {
    if order.by.is_empty() {
        return;
    }
    let pointer = format!("/{}", order.by.replace('.', "/"));
    items.sort_by(|a, b| {
        match (a.pointer(&pointer), b.pointer(&pointer)) {
            (Some(x), Some(y)) => {
                let ordering = compare_values(x, y);
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
