/// 实体同步模块
///
/// 职责：
/// - 维护服务端集合的客户端镜像（列表、筛选、分页）
/// - 创建/更新/删除的确认后落地
/// - 开关字段的乐观更新与回滚
/// - 请求序号，丢弃过期的列表/统计响应

pub mod engine;
pub mod sequencer;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use engine::{EngineSnapshot, EntitySyncEngine, ListOutcome, ToggleOutcome};
pub use sequencer::FetchSequencer;
pub use state::{CollectionState, LoadPhase, MutationFlags};
