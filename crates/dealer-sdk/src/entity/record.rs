//! 实体记录
//!
//! 服务端拥有记录的全部字段；客户端只解释 `id`、`createdAt`、`updatedAt`，
//! 其余字段保存在 `fields` 里原样透传。

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DealerSDKError, Result};

use super::Relation;

/// 一条实体记录（品牌、车型、车辆、销售单……）
///
/// 反序列化先读成对象再取 `id`：优先 `id`，没有时用 `_id`。
/// 两者同时出现（mongoose 的 virtual id）时 `_id` 被丢弃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Map<String, Value>")]
pub struct EntityRecord {
    /// 服务端分配的主键，集合内唯一
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// 业务字段（不解释）
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for EntityRecord {
    type Error = String;

    fn try_from(mut object: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let primary = object.remove("id").filter(|v| !v.is_null());
        let mongo = object.remove("_id").filter(|v| !v.is_null());
        let id = match primary.or(mongo) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(format!(
                    "id must be a string or number, got {}",
                    value_kind(&other)
                ))
            }
            None => return Err("missing field `id`".to_string()),
        };
        let created_at = take_timestamp(&mut object, "createdAt")?;
        let updated_at = take_timestamp(&mut object, "updatedAt")?;
        Ok(Self {
            id,
            created_at,
            updated_at,
            fields: object,
        })
    }
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Some(created_at.into()),
            updated_at: None,
            fields: Map::new(),
        }
    }

    /// 链式设置业务字段
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// 从列表项解析：只要求非空 `id`
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(DealerSDKError::MalformedResponse(format!(
                "expected record object, got {}",
                value_kind(&value)
            )));
        }
        let record: EntityRecord = serde_json::from_value(value)
            .map_err(|e| DealerSDKError::MalformedResponse(format!("invalid record: {}", e)))?;
        if record.id.trim().is_empty() {
            return Err(DealerSDKError::MalformedResponse(
                "record is missing id".to_string(),
            ));
        }
        Ok(record)
    }

    /// 从 create/update 的返回值解析：服务端记录是权威的，
    /// 缺 `createdAt` 视为结构不完整，不补默认值
    pub fn from_canonical_value(value: Value) -> Result<Self> {
        let record = Self::from_value(value)?;
        if record.created_at.is_none() {
            return Err(DealerSDKError::MalformedResponse(format!(
                "record {} is missing createdAt",
                record.id
            )));
        }
        Ok(record)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 读取字段；`id`/`createdAt`/`updatedAt` 也可按名读取
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "createdAt" => self.created_at.clone().map(Value::String),
            "updatedAt" => self.updated_at.clone().map(Value::String),
            _ => self.fields.get(field).cloned(),
        }
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// 写入业务字段（`id` 不可改）
    pub fn set(&mut self, field: &str, value: Value) {
        match field {
            "id" => {}
            "createdAt" => self.created_at = timestamp_from_value(&value),
            "updatedAt" => self.updated_at = timestamp_from_value(&value),
            _ => {
                self.fields.insert(field.to_string(), value);
            }
        }
    }

    /// 把服务端返回的字段覆盖到本地记录上（服务端优先，缺省字段保留本地值）
    pub fn merge_from(&mut self, server: &Map<String, Value>) {
        for (key, value) in server {
            match key.as_str() {
                "id" | "_id" => {}
                "createdAt" => {
                    if let Some(ts) = timestamp_from_value(value) {
                        self.created_at = Some(ts);
                    }
                }
                "updatedAt" => {
                    if let Some(ts) = timestamp_from_value(value) {
                        self.updated_at = Some(ts);
                    }
                }
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// 关联字段：可能是 id 字符串，也可能是服务端 populate 后的对象
    pub fn relation(&self, field: &str) -> Option<Relation> {
        self.fields.get(field).and_then(Relation::from_value)
    }

    pub fn relation_id(&self, field: &str) -> Option<String> {
        self.relation(field).map(|r| r.id().to_string())
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.updated_at.as_deref().and_then(parse_timestamp)
    }
}

/// 解析 RFC 3339 或纯日期（`2024-01-01`）
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// 时间字段统一保存为字符串；数字视为毫秒时间戳
fn timestamp_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|dt| dt.to_rfc3339()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 时间戳接受字符串或毫秒数字，null 视为缺省
fn take_timestamp(
    object: &mut Map<String, Value>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => timestamp_from_value(&value)
            .map(Some)
            .ok_or_else(|| format!("invalid timestamp `{}`: {}", key, value_kind(&value))),
    }
}
