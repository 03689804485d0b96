//! 经销商后台实体模型
//!
//! 引擎只认 `id`、`createdAt`、`updatedAt`，其余业务字段原样透传。

mod entity_type;
mod record;
mod relation;

pub use entity_type::EntityKind;
pub use record::EntityRecord;
pub use relation::Relation;
