//! 同步层配置

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::error::{DealerSDKError, Result};
use crate::query::{FilterState, SortOrder};

/// 单个引擎的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 默认每页条数
    pub default_page_size: u32,
    /// 每页条数上限（set_page_size 会被截断到此值）
    pub max_page_size: u32,
    /// 默认排序字段；None 表示交给服务端
    pub default_sort_by: Option<String>,
    pub default_sort_order: SortOrder,
    /// 变更成功后是否刷新统计
    pub stats_enabled: bool,
    /// 覆盖实体类型自带的开关字段（如 "active"）
    pub toggle_field: Option<String>,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            default_sort_by: Some("createdAt".to_string()),
            default_sort_order: SortOrder::Desc,
            stats_enabled: true,
            toggle_field: None,
            event_buffer_size: 256,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(DealerSDKError::Config("default_page_size must be > 0".to_string()));
        }
        if self.max_page_size < self.default_page_size {
            return Err(DealerSDKError::Config(format!(
                "max_page_size ({}) is smaller than default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(DealerSDKError::Config("event_buffer_size must be > 0".to_string()));
        }
        if matches!(self.toggle_field.as_deref(), Some(f) if f.trim().is_empty()) {
            return Err(DealerSDKError::Config("toggle_field must not be empty".to_string()));
        }
        Ok(())
    }

    /// refresh() 恢复到的筛选状态
    pub fn default_filters(&self) -> FilterState {
        FilterState::with_sort(self.default_sort_by.clone(), self.default_sort_order)
    }

    /// 截断到 1..=max_page_size
    pub fn clamp_page_size(&self, limit: u32) -> u32 {
        limit.clamp(1, self.max_page_size.max(1))
    }
}

/// 整个后台的配置：公共配置 + 按实体类型覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub sync: SyncConfig,
    pub overrides: BTreeMap<EntityKind, SyncConfig>,
}

impl ConsoleConfig {
    pub fn builder() -> ConsoleConfigBuilder {
        ConsoleConfigBuilder::new()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ConsoleConfig = serde_json::from_str(raw)
            .map_err(|e| DealerSDKError::Config(format!("invalid console config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        for (kind, config) in &self.overrides {
            config
                .validate()
                .map_err(|e| DealerSDKError::Config(format!("{}: {}", kind, e.user_message())))?;
        }
        Ok(())
    }

    /// 某个实体类型最终生效的配置
    pub fn for_kind(&self, kind: EntityKind) -> SyncConfig {
        self.overrides.get(&kind).cloned().unwrap_or_else(|| self.sync.clone())
    }
}

/// 配置构建器
pub struct ConsoleConfigBuilder {
    config: ConsoleConfig,
}

impl ConsoleConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ConsoleConfig::default(),
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.sync.default_page_size = page_size;
        self
    }

    pub fn max_page_size(mut self, max_page_size: u32) -> Self {
        self.config.sync.max_page_size = max_page_size;
        self
    }

    pub fn sort<S: Into<String>>(mut self, sort_by: S, order: SortOrder) -> Self {
        self.config.sync.default_sort_by = Some(sort_by.into());
        self.config.sync.default_sort_order = order;
        self
    }

    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.config.sync.stats_enabled = enabled;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.sync.event_buffer_size = size;
        self
    }

    /// 针对某个实体类型单独设置
    pub fn override_kind(mut self, kind: EntityKind, config: SyncConfig) -> Self {
        self.config.overrides.insert(kind, config);
        self
    }

    pub fn build(self) -> Result<ConsoleConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConsoleConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
