//! 事件系统模块 - 引擎状态变化的广播
//!
//! 表格、统计卡片等展示组件订阅这里的事件后重新读取引擎快照，
//! 不需要轮询。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::entity::EntityKind;

/// 同步引擎事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 列表加载完成（整页替换）
    ListLoaded {
        kind: EntityKind,
        page: u32,
        item_count: usize,
        total: u64,
        timestamp: i64,
    },
    /// 列表加载失败（已清空）
    ListFailed {
        kind: EntityKind,
        error: String,
        timestamp: i64,
    },
    RecordCreated {
        kind: EntityKind,
        id: String,
        timestamp: i64,
    },
    RecordUpdated {
        kind: EntityKind,
        id: String,
        timestamp: i64,
    },
    RecordDeleted {
        kind: EntityKind,
        id: String,
        timestamp: i64,
    },
    /// 开关切换已被服务端确认
    StatusToggled {
        kind: EntityKind,
        id: String,
        value: bool,
        timestamp: i64,
    },
    /// 乐观更新失败，已恢复到切换前
    ToggleRolledBack {
        kind: EntityKind,
        id: String,
        error: String,
        timestamp: i64,
    },
    StatsRefreshed {
        kind: EntityKind,
        total: u64,
        timestamp: i64,
    },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ListLoaded { .. } => "list_loaded",
            SyncEvent::ListFailed { .. } => "list_failed",
            SyncEvent::RecordCreated { .. } => "record_created",
            SyncEvent::RecordUpdated { .. } => "record_updated",
            SyncEvent::RecordDeleted { .. } => "record_deleted",
            SyncEvent::StatusToggled { .. } => "status_toggled",
            SyncEvent::ToggleRolledBack { .. } => "toggle_rolled_back",
            SyncEvent::StatsRefreshed { .. } => "stats_refreshed",
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            SyncEvent::ListLoaded { kind, .. }
            | SyncEvent::ListFailed { kind, .. }
            | SyncEvent::RecordCreated { kind, .. }
            | SyncEvent::RecordUpdated { kind, .. }
            | SyncEvent::RecordDeleted { kind, .. }
            | SyncEvent::StatusToggled { kind, .. }
            | SyncEvent::ToggleRolledBack { kind, .. }
            | SyncEvent::StatsRefreshed { kind, .. } => *kind,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            SyncEvent::ListLoaded { timestamp, .. }
            | SyncEvent::ListFailed { timestamp, .. }
            | SyncEvent::RecordCreated { timestamp, .. }
            | SyncEvent::RecordUpdated { timestamp, .. }
            | SyncEvent::RecordDeleted { timestamp, .. }
            | SyncEvent::StatusToggled { timestamp, .. }
            | SyncEvent::ToggleRolledBack { timestamp, .. }
            | SyncEvent::StatsRefreshed { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤器
    pub event_types: Option<Vec<String>>,
    /// 实体类型过滤器
    pub kinds: Option<Vec<EntityKind>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn matches(&self, event: &SyncEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SyncEvent>,
    /// 事件监听器映射
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<i64>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {} ({})", event.event_type(), event.kind());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景，仅打 debug
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器（`"*"` 监听全部）
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners.entry(event_type.to_string()).or_default().push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;

        info!("Cleared all event listeners");
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤后的事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SyncEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SyncEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<SyncEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 事件生成器
pub mod event_builders {
    use super::*;

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn list_loaded(kind: EntityKind, page: u32, item_count: usize, total: u64) -> SyncEvent {
        SyncEvent::ListLoaded {
            kind,
            page,
            item_count,
            total,
            timestamp: now_millis(),
        }
    }

    pub fn list_failed(kind: EntityKind, error: String) -> SyncEvent {
        SyncEvent::ListFailed {
            kind,
            error,
            timestamp: now_millis(),
        }
    }

    pub fn record_created(kind: EntityKind, id: &str) -> SyncEvent {
        SyncEvent::RecordCreated {
            kind,
            id: id.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn record_updated(kind: EntityKind, id: &str) -> SyncEvent {
        SyncEvent::RecordUpdated {
            kind,
            id: id.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn record_deleted(kind: EntityKind, id: &str) -> SyncEvent {
        SyncEvent::RecordDeleted {
            kind,
            id: id.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn status_toggled(kind: EntityKind, id: &str, value: bool) -> SyncEvent {
        SyncEvent::StatusToggled {
            kind,
            id: id.to_string(),
            value,
            timestamp: now_millis(),
        }
    }

    pub fn toggle_rolled_back(kind: EntityKind, id: &str, error: String) -> SyncEvent {
        SyncEvent::ToggleRolledBack {
            kind,
            id: id.to_string(),
            error,
            timestamp: now_millis(),
        }
    }

    pub fn stats_refreshed(kind: EntityKind, total: u64) -> SyncEvent {
        SyncEvent::StatsRefreshed {
            kind,
            total,
            timestamp: now_millis(),
        }
    }
}
