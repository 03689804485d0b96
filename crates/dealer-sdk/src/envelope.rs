//! 响应信封归一化
//!
//! 各资源的后端路由返回的外壳不统一：
//!
//! ```text
//! {success, data: [...], pagination}
//! {data: {models: [...], pagination}}
//! {makes: [...], pagination}
//! [...]
//! ```
//!
//! 这里用一套按集合字段名参数化的函数统一成 `ListPage`，引擎只消费归一化后的结果。

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::warn;

use crate::entity::EntityRecord;
use crate::error::DealerSDKError;
use crate::query::PaginationState;
use crate::stats::StatsView;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("empty response body")]
    Empty,

    #[error("collection `{0}` not found in response")]
    MissingCollection(String),

    #[error("invalid item at index {index}: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("expected {expected}, got {actual}")]
    UnexpectedShape {
        expected: &'static str,
        actual: &'static str,
    },
}

impl From<EnvelopeError> for DealerSDKError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::Rejected(message) => DealerSDKError::Other(message),
            other => DealerSDKError::MalformedResponse(other.to_string()),
        }
    }
}

/// 归一化后的一页数据
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<EntityRecord>,
    pub pagination: PaginationState,
}

/// 归一化列表响应
///
/// `requested_page`/`requested_limit` 用于服务端没给分页信息时兜底。
/// 服务端给的 `pages/hasNext/hasPrev` 不采信，一律由 page/limit/total 重算。
pub fn normalize_list(
    response: Value,
    collection_key: &str,
    requested_page: u32,
    requested_limit: u32,
) -> Result<ListPage, EnvelopeError> {
    check_rejected(&response)?;

    let (raw_items, raw_pagination) = split_list(response, collection_key)?;

    let mut seen = HashSet::with_capacity(raw_items.len());
    let mut items = Vec::with_capacity(raw_items.len());
    for (index, raw) in raw_items.into_iter().enumerate() {
        let record = EntityRecord::from_value(raw).map_err(|e| EnvelopeError::InvalidItem {
            index,
            reason: e.user_message(),
        })?;
        if !seen.insert(record.id.clone()) {
            warn!("duplicate id {} in `{}` page, keeping first", record.id, collection_key);
            continue;
        }
        items.push(record);
    }

    let pagination = match raw_pagination.as_ref().and_then(Value::as_object) {
        Some(p) => {
            let page = read_u32(p, "page").unwrap_or(requested_page);
            let limit = read_u32(p, "limit").unwrap_or(requested_limit);
            let total = read_u64(p, "total").unwrap_or(items.len() as u64);
            PaginationState::computed(page, limit, total)
        }
        None => {
            // 没有分页信息：把本页当作最后一页
            let page = requested_page.max(1);
            let limit = requested_limit
                .max(1)
                .max(u32::try_from(items.len()).unwrap_or(u32::MAX));
            let total = u64::from(page - 1) * u64::from(limit) + items.len() as u64;
            PaginationState::computed(page, limit, total)
        }
    };

    Ok(ListPage { items, pagination })
}

/// 解出单条记录对象：`{data: {...}}`、`{data: {<record_key>: {...}}}` 或裸对象
pub fn unwrap_record(response: Value, record_key: &str) -> Result<Map<String, Value>, EnvelopeError> {
    check_rejected(&response)?;

    let body = match response {
        Value::Object(mut outer) if outer.contains_key("data") && !has_id(&outer) => {
            outer.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    match body {
        Value::Null => Err(EnvelopeError::Empty),
        Value::Object(object) if object.is_empty() => Err(EnvelopeError::Empty),
        Value::Object(object) if has_id(&object) => Ok(object),
        Value::Object(mut object) => match object.remove(record_key) {
            Some(Value::Object(inner)) if !inner.is_empty() => Ok(inner),
            Some(Value::Null) | None => Err(EnvelopeError::Empty),
            Some(other) => Err(EnvelopeError::UnexpectedShape {
                expected: "object",
                actual: kind_of(&other),
            }),
        },
        other => Err(EnvelopeError::UnexpectedShape {
            expected: "object",
            actual: kind_of(&other),
        }),
    }
}

/// 统计响应：`{data: {...}}`、`{data: {stats: {...}}}` 或裸对象
pub fn normalize_stats(response: Value) -> Result<StatsView, EnvelopeError> {
    check_rejected(&response)?;

    let mut body = match response {
        Value::Object(mut outer) if outer.contains_key("data") => {
            outer.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    if let Some(inner) = body.get_mut("stats").map(Value::take) {
        body = inner;
    }

    match body {
        Value::Object(object) => Ok(StatsView::from_object(&object)),
        Value::Null => Err(EnvelopeError::Empty),
        other => Err(EnvelopeError::UnexpectedShape {
            expected: "object",
            actual: kind_of(&other),
        }),
    }
}

fn split_list(
    response: Value,
    collection_key: &str,
) -> Result<(Vec<Value>, Option<Value>), EnvelopeError> {
    match response {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut outer) => {
            let outer_pagination = outer.remove("pagination");
            match outer.remove("data") {
                Some(Value::Array(items)) => Ok((items, outer_pagination)),
                Some(Value::Object(mut inner)) => {
                    let inner_pagination = inner.remove("pagination");
                    match inner.remove(collection_key) {
                        Some(Value::Array(items)) => Ok((items, inner_pagination.or(outer_pagination))),
                        _ => Err(EnvelopeError::MissingCollection(collection_key.to_string())),
                    }
                }
                Some(Value::Null) => Err(EnvelopeError::Empty),
                Some(other) => Err(EnvelopeError::UnexpectedShape {
                    expected: "array",
                    actual: kind_of(&other),
                }),
                None => match outer.remove(collection_key) {
                    Some(Value::Array(items)) => Ok((items, outer_pagination)),
                    _ => Err(EnvelopeError::MissingCollection(collection_key.to_string())),
                },
            }
        }
        Value::Null => Err(EnvelopeError::Empty),
        other => Err(EnvelopeError::UnexpectedShape {
            expected: "array or object",
            actual: kind_of(&other),
        }),
    }
}

/// `{success: false, message}` 形式的业务失败
fn check_rejected(response: &Value) -> Result<(), EnvelopeError> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let message = response
            .get("message")
            .or_else(|| response.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        return Err(EnvelopeError::Rejected(message.to_string()));
    }
    Ok(())
}

fn has_id(object: &Map<String, Value>) -> bool {
    object.contains_key("id") || object.contains_key("_id")
}

fn read_u64(object: &Map<String, Value>, key: &str) -> Option<u64> {
    match object.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 超出 u32 范围视为缺省
fn read_u32(object: &Map<String, Value>, key: &str) -> Option<u32> {
    read_u64(object, key).and_then(|v| u32::try_from(v).ok())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
