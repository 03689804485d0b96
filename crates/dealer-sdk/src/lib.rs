//! Dealer SDK - 车行后台的实体同步层
//!
//! 后台的每个资源页面（品牌、车型、车辆类型、驱动方式、状态、车辆、销售、咨询）
//! 都由同一个同步引擎驱动：
//! - 📋 列表：整页替换，筛选/分页状态与请求保持一致
//! - ✍️ 创建/更新/删除：服务端确认后落地，并刷新统计
//! - 🔁 开关切换：乐观更新，失败回滚
//! - 📊 统计：变更后后台刷新，最终一致
//! - 📨 通知：成功/失败通过注入的 NotificationSink 发出
//! - ⚙️ 事件系统：所有状态变化都广播 SyncEvent
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dealer_sdk::{ConsoleConfig, DealerConsole, EntityKind, RemoteCollectionService, TracingNotificationSink};
//!
//! # fn service_for(kind: EntityKind) -> Arc<dyn RemoteCollectionService> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConsoleConfig::builder().page_size(20).build()?;
//!     let console = DealerConsole::new(config, service_for, Arc::new(TracingNotificationSink))?;
//!
//!     let makes = console.engine(EntityKind::Make);
//!     makes.mount().await;
//!     makes.set_search("honda").await;
//!
//!     if let Some(record) = makes.items().first().cloned() {
//!         makes.toggle_status(&record, false).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod events;
pub mod notify;
pub mod query;
pub mod service;
pub mod stats;
pub mod sync;
pub mod version;

pub use config::{ConsoleConfig, ConsoleConfigBuilder, SyncConfig};
pub use console::DealerConsole;
pub use entity::{EntityKind, EntityRecord, Relation};
pub use envelope::{normalize_list, normalize_stats, unwrap_record, EnvelopeError, ListPage};
pub use error::{DealerSDKError, Result};
pub use events::{EventFilter, EventManager, SyncEvent};
pub use notify::{
    MemoryNotificationSink, Notification, NotificationLevel, NotificationSink, TracingNotificationSink,
};
pub use query::{FilterState, ListParams, PaginationState, SortOrder};
pub use service::RemoteCollectionService;
pub use stats::StatsView;
pub use sync::{
    CollectionState, EngineSnapshot, EntitySyncEngine, ListOutcome, LoadPhase, MutationFlags,
    ToggleOutcome,
};
pub use version::{version_string, SDK_VERSION};
