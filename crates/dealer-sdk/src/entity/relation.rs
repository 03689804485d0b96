use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityRecord;

/// 关联字段：后端按需 populate，可能只给 id，也可能给整条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relation {
    Id(String),
    Populated(Box<EntityRecord>),
}

impl Relation {
    /// 关联对象的 id，无论是否 populate
    pub fn id(&self) -> &str {
        match self {
            Relation::Id(id) => id,
            Relation::Populated(record) => &record.id,
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Relation::Populated(_))
    }

    /// 下拉框里展示的文字：populate 时取 `name`，否则退回 id
    pub fn label(&self) -> &str {
        match self {
            Relation::Id(id) => id,
            Relation::Populated(record) => record.str_field("name").unwrap_or(&record.id),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Relation::Id(s.clone())),
            Value::Object(_) => EntityRecord::from_value(value.clone())
                .ok()
                .map(|record| Relation::Populated(Box::new(record))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_id() {
        let relation = Relation::from_value(&json!("m1")).unwrap();
        assert_eq!(relation.id(), "m1");
        assert!(!relation.is_populated());
        assert_eq!(relation.label(), "m1");
    }

    #[test]
    fn test_populated_object() {
        let relation = Relation::from_value(&json!({"id": "m1", "name": "Honda"})).unwrap();
        assert_eq!(relation.id(), "m1");
        assert!(relation.is_populated());
        assert_eq!(relation.label(), "Honda");
    }

    #[test]
    fn test_unusable_values() {
        assert!(Relation::from_value(&json!("")).is_none());
        assert!(Relation::from_value(&json!(null)).is_none());
        assert!(Relation::from_value(&json!({"name": "no id"})).is_none());
        assert!(Relation::from_value(&json!(7)).is_none());
    }

    #[test]
    fn test_untagged_deserialize() {
        let ids: Vec<Relation> =
            serde_json::from_value(json!(["a", {"id": "b", "name": "B"}])).unwrap();
        assert_eq!(ids[0].id(), "a");
        assert_eq!(ids[1].id(), "b");
    }
}
