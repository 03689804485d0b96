//! 后台控制台：每个实体类型一个同步引擎
//!
//! 引擎之间不共享集合状态；共享的只有通知出口和事件总线。

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::ConsoleConfig;
use crate::entity::EntityKind;
use crate::error::{DealerSDKError, Result};
use crate::events::{EventFilter, EventManager, FilteredEventReceiver, SyncEvent};
use crate::notify::NotificationSink;
use crate::service::RemoteCollectionService;
use crate::sync::{EntitySyncEngine, ListOutcome};
use crate::version::version_string;

pub struct DealerConsole {
    config: ConsoleConfig,
    engines: BTreeMap<EntityKind, EntitySyncEngine>,
    events: Arc<EventManager>,
}

impl DealerConsole {
    /// `service_factory` 为每个实体类型提供一个远端服务
    pub fn new<F>(
        config: ConsoleConfig,
        service_factory: F,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self>
    where
        F: Fn(EntityKind) -> Arc<dyn RemoteCollectionService>,
    {
        config.validate()?;
        let events = Arc::new(EventManager::new(config.sync.event_buffer_size));

        let engines = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let engine = EntitySyncEngine::new(
                    kind,
                    config.for_kind(kind),
                    service_factory(kind),
                    notifier.clone(),
                    events.clone(),
                );
                (kind, engine)
            })
            .collect();

        info!(
            "✅ dealer console ready: {} ({} entity kinds)",
            version_string(),
            EntityKind::ALL.len()
        );
        Ok(Self {
            config,
            engines,
            events,
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn engine(&self, kind: EntityKind) -> &EntitySyncEngine {
        &self.engines[&kind]
    }

    /// 按资源名查找引擎（如路由参数 "vehicle_type"）
    pub fn engine_by_name(&self, name: &str) -> Result<&EntitySyncEngine> {
        let kind: EntityKind = name
            .parse()
            .map_err(|_| DealerSDKError::InvalidArgument(format!("unknown entity kind: {}", name)))?;
        Ok(self.engine(kind))
    }

    pub fn engines(&self) -> impl Iterator<Item = &EntitySyncEngine> {
        self.engines.values()
    }

    /// 并发挂载所有引擎
    pub async fn mount_all(&self) -> Vec<(EntityKind, ListOutcome)> {
        let outcomes = join_all(self.engines.values().map(|engine| engine.mount())).await;
        self.engines.keys().copied().zip(outcomes).collect()
    }

    pub async fn wait_for_stats(&self) {
        join_all(self.engines.values().map(|engine| engine.wait_for_stats())).await;
    }

    pub fn events(&self) -> Arc<EventManager> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        self.events.subscribe_filtered(filter)
    }
}
