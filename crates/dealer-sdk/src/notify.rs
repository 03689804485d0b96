//! 用户可见通知（toast）
//!
//! 引擎不直接依赖 UI：成功/失败提示通过注入的 `NotificationSink` 发出，
//! 平台层决定怎么展示。

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::DealerSDKError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// 一条通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    /// 标题，例如 "Make created successfully"
    pub title: String,
    /// 失败时附带的错误描述
    pub description: Option<String>,
}

impl Notification {
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            description: None,
        }
    }

    pub fn failure(title: impl Into<String>, error: &DealerSDKError) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            description: Some(error.user_message()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

/// 通知出口（由平台层实现）
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// 只写日志的默认实现（无 UI 的场景，如脚本/压测）
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => info!("✅ {}", notification.title),
            NotificationLevel::Error => error!(
                "❌ {}: {}",
                notification.title,
                notification.description.as_deref().unwrap_or("")
            ),
        }
    }
}

/// 把通知收集在内存里，供调用方轮询或测试断言
#[derive(Debug, Default, Clone)]
pub struct MemoryNotificationSink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.received.lock().iter().filter(|n| n.is_error()).cloned().collect()
    }

    pub fn successes(&self) -> Vec<Notification> {
        self.received.lock().iter().filter(|n| !n.is_error()).cloned().collect()
    }

    /// 取走并清空
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock())
    }
}

impl NotificationSink for MemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}
