//! 实体同步引擎 - 每个资源页面一个实例
//!
//! 维护服务端集合在客户端的镜像：
//! - 列表：整页替换，带请求序号，乱序返回的旧响应直接丢弃
//! - 创建/更新/删除：服务端确认后再改本地（commit-then-reflect）
//! - 开关切换：唯一的乐观路径，失败回滚到切换前快照
//! - 统计：变更成功后后台刷新，失败静默保留旧值
//!
//! ## NOTE: Engine 不做重试
//!
//! EntitySyncEngine does not retry. A failed call is reported once (error
//! field or returned `Err`) and the user repeats the action.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::entity::{EntityKind, EntityRecord};
use crate::envelope::{normalize_list, normalize_stats, unwrap_record};
use crate::error::{DealerSDKError, Result};
use crate::events::{event_builders, EventManager, SyncEvent};
use crate::notify::{Notification, NotificationSink};
use crate::query::{FilterState, ListParams, PaginationState, SortOrder};
use crate::service::RemoteCollectionService;
use crate::stats::StatsView;

use super::sequencer::FetchSequencer;
use super::state::{CollectionState, InFlight, LoadPhase, MutationFlags};

/// 一次列表请求的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    /// 响应已应用
    Loaded { items: usize, total: u64 },
    /// 已被更新的请求取代，响应被丢弃
    Superseded,
    /// 没有发请求（如已在最后一页时 next_page）
    Skipped,
    /// 请求失败，集合已清空并记录 error
    Failed(DealerSDKError),
}

impl ListOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ListOutcome::Loaded { .. })
    }
}

/// 开关切换的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// 服务端返回了完整记录，已合并
    Confirmed(EntityRecord),
    /// 服务端返回内容不可信，已丢弃乐观值并重新拉取列表
    Refetched(ListOutcome),
}

/// 展示层读取的引擎状态
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub kind: EntityKind,
    pub data: Vec<EntityRecord>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub phase: LoadPhase,
    pub stats: Option<StatsView>,
    pub pagination: PaginationState,
    pub filters: FilterState,
    pub mutations: MutationFlags,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Create,
    Update,
    Delete,
    Toggle,
}

struct EngineState {
    collection: CollectionState,
    filters: FilterState,
    /// 下一次请求的页码/每页条数
    page: u32,
    limit: u32,
    /// 最近一次响应计算出的分页
    pagination: PaginationState,
    /// `pagination` 是否来自一次成功的列表响应
    pagination_known: bool,
    stats: Option<StatsView>,
    in_flight: InFlight,
    /// 每条记录最近一次切换的代号（最后一次写入生效）
    toggle_generations: HashMap<String, u64>,
    next_toggle_generation: u64,
}

struct EngineInner {
    kind: EntityKind,
    config: SyncConfig,
    service: Arc<dyn RemoteCollectionService>,
    notifier: Arc<dyn NotificationSink>,
    events: Arc<EventManager>,
    state: Mutex<EngineState>,
    list_seq: FetchSequencer,
    stats_seq: FetchSequencer,
    stats_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// 实体同步引擎
#[derive(Clone)]
pub struct EntitySyncEngine {
    inner: Arc<EngineInner>,
}

/// 进行中计数的 RAII 守卫
struct InFlightGuard {
    inner: Arc<EngineInner>,
    mutation: Mutation,
}

impl InFlightGuard {
    fn new(inner: &Arc<EngineInner>, mutation: Mutation) -> Self {
        {
            let mut state = inner.state.lock();
            *counter(&mut state.in_flight, mutation) += 1;
        }
        Self {
            inner: inner.clone(),
            mutation,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let count = counter(&mut state.in_flight, self.mutation);
        *count = count.saturating_sub(1);
    }
}

fn counter(in_flight: &mut InFlight, mutation: Mutation) -> &mut u32 {
    match mutation {
        Mutation::Create => &mut in_flight.creating,
        Mutation::Update => &mut in_flight.updating,
        Mutation::Delete => &mut in_flight.deleting,
        Mutation::Toggle => &mut in_flight.toggling,
    }
}

impl EntitySyncEngine {
    pub fn new(
        kind: EntityKind,
        config: SyncConfig,
        service: Arc<dyn RemoteCollectionService>,
        notifier: Arc<dyn NotificationSink>,
        events: Arc<EventManager>,
    ) -> Self {
        let limit = config.clamp_page_size(config.default_page_size);
        let state = EngineState {
            collection: CollectionState::default(),
            filters: config.default_filters(),
            page: 1,
            limit,
            pagination: PaginationState::empty(limit),
            pagination_known: false,
            stats: None,
            in_flight: InFlight::default(),
            toggle_generations: HashMap::new(),
            next_toggle_generation: 0,
        };
        Self {
            inner: Arc::new(EngineInner {
                kind,
                config,
                service,
                notifier,
                events,
                state: Mutex::new(state),
                list_seq: FetchSequencer::new(),
                stats_seq: FetchSequencer::new(),
                stats_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// 开关字段：配置覆盖优先，其次实体类型自带
    pub fn toggle_field(&self) -> Option<&str> {
        self.inner
            .config
            .toggle_field
            .as_deref()
            .or_else(|| self.inner.kind.toggle_field())
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.inner.state.lock();
        EngineSnapshot {
            kind: self.inner.kind,
            data: state.collection.items.clone(),
            is_loading: state.collection.is_loading,
            error: state.collection.error.clone(),
            phase: state.collection.phase,
            stats: state.stats.clone(),
            pagination: state.pagination,
            filters: state.filters.clone(),
            mutations: state.in_flight.into(),
        }
    }

    pub fn items(&self) -> Vec<EntityRecord> {
        self.inner.state.lock().collection.items.clone()
    }

    pub fn get(&self, id: &str) -> Option<EntityRecord> {
        self.inner.state.lock().collection.find(id).cloned()
    }

    pub fn stats(&self) -> Option<StatsView> {
        self.inner.state.lock().stats.clone()
    }

    /// 下一次列表请求会使用的页码
    pub fn requested_page(&self) -> u32 {
        self.inner.state.lock().page
    }

    // ========== 列表 ==========

    /// 首次进入页面：拉列表 + 刷新统计
    pub async fn mount(&self) -> ListOutcome {
        info!("mount {} engine", self.inner.kind);
        self.schedule_stats_refresh();
        self.list().await
    }

    /// 按当前筛选与分页拉取一页，成功时整页替换
    pub async fn list(&self) -> ListOutcome {
        let kind = self.inner.kind;
        let (params, tag) = {
            let mut state = self.inner.state.lock();
            state.collection.begin_loading();
            let params = ListParams::new(&state.filters, state.page, state.limit);
            (params, self.inner.list_seq.issue())
        };
        debug!("list {} #{} page={} limit={}", kind, tag, params.page, params.limit);

        let result = match self.inner.service.list(&params).await {
            Ok(response) => normalize_list(response, kind.collection_key(), params.page, params.limit)
                .map_err(DealerSDKError::from),
            Err(e) => Err(e),
        };

        let event = {
            let mut state = self.inner.state.lock();
            if !self.inner.list_seq.is_current(tag) {
                debug!("list {} #{} superseded by #{}, dropping response", kind, tag, self.inner.list_seq.latest());
                return ListOutcome::Superseded;
            }
            match &result {
                Ok(page) => {
                    state.collection.replace_all(page.items.clone());
                    state.pagination = page.pagination;
                    state.pagination_known = true;
                    state.page = page.pagination.page;
                    event_builders::list_loaded(kind, page.pagination.page, page.items.len(), page.pagination.total)
                }
                Err(e) => {
                    state.collection.fail(e.user_message());
                    state.pagination = PaginationState::computed(params.page, params.limit, 0);
                    state.pagination_known = false;
                    event_builders::list_failed(kind, e.user_message())
                }
            }
        };
        self.inner.events.emit(event).await;

        match result {
            Ok(page) => {
                debug!("✅ list {} loaded {} of {}", kind, page.items.len(), page.pagination.total);
                ListOutcome::Loaded {
                    items: page.items.len(),
                    total: page.pagination.total,
                }
            }
            Err(e) => {
                error!("❌ list {} failed: {}", kind, e);
                self.inner.notifier.notify(Notification::failure(
                    format!("Failed to load {} list", self.noun()),
                    &e,
                ));
                ListOutcome::Failed(e)
            }
        }
    }

    /// 重置筛选、回到第一页并重新拉取
    pub async fn refresh(&self) -> ListOutcome {
        {
            let mut state = self.inner.state.lock();
            state.filters = self.inner.config.default_filters();
            state.page = 1;
        }
        self.schedule_stats_refresh();
        self.list().await
    }

    // ========== 筛选 / 分页 ==========

    pub async fn set_search(&self, search: impl Into<String>) -> ListOutcome {
        let search = search.into();
        self.update_filters(|filters| filters.search = search);
        self.list().await
    }

    /// 设置字段筛选；空值等同于清除
    pub async fn set_filter(&self, key: &str, value: impl Into<String>) -> ListOutcome {
        let value = value.into();
        self.update_filters(|filters| {
            if value.is_empty() {
                filters.filters.remove(key);
            } else {
                filters.filters.insert(key.to_string(), value);
            }
        });
        self.list().await
    }

    pub async fn clear_filter(&self, key: &str) -> ListOutcome {
        self.update_filters(|filters| {
            filters.filters.remove(key);
        });
        self.list().await
    }

    pub async fn set_sort(&self, sort_by: impl Into<String>, order: SortOrder) -> ListOutcome {
        let sort_by = sort_by.into();
        self.update_filters(|filters| {
            filters.sort_by = Some(sort_by);
            filters.sort_order = order;
        });
        self.list().await
    }

    /// 跳页
    ///
    /// 页码截断到最近一次成功响应的 `1..=page_count`；还没有成功响应时
    /// （如挂载前从 URL 恢复页码）原样请求，由服务端的分页结果为准。
    pub async fn go_to_page(&self, page: u32) -> ListOutcome {
        {
            let mut state = self.inner.state.lock();
            state.page = if state.pagination_known {
                state.pagination.clamp_page(page)
            } else {
                page.max(1)
            };
        }
        self.list().await
    }

    pub async fn next_page(&self) -> ListOutcome {
        let target = {
            let state = self.inner.state.lock();
            state.pagination.has_next.then(|| state.pagination.page + 1)
        };
        match target {
            Some(page) => self.go_to_page(page).await,
            None => ListOutcome::Skipped,
        }
    }

    pub async fn prev_page(&self) -> ListOutcome {
        let target = {
            let state = self.inner.state.lock();
            state.pagination.has_prev.then(|| state.pagination.page - 1)
        };
        match target {
            Some(page) => self.go_to_page(page).await,
            None => ListOutcome::Skipped,
        }
    }

    /// 修改每页条数（截断到配置上限），回到第一页
    pub async fn set_page_size(&self, limit: u32) -> ListOutcome {
        {
            let mut state = self.inner.state.lock();
            state.limit = self.inner.config.clamp_page_size(limit);
            state.page = 1;
        }
        self.list().await
    }

    /// 筛选变化一律回到第一页
    fn update_filters(&self, apply: impl FnOnce(&mut FilterState)) {
        let mut state = self.inner.state.lock();
        apply(&mut state.filters);
        state.page = 1;
    }

    // ========== 变更 ==========

    /// 创建：服务端确认后插到列表最前
    pub async fn create(&self, payload: Value) -> Result<EntityRecord> {
        let kind = self.inner.kind;
        let result = {
            let _guard = InFlightGuard::new(&self.inner, Mutation::Create);
            self.fetch_canonical(self.inner.service.create(payload).await)
        };

        match result {
            Ok(record) => {
                self.inner.state.lock().collection.prepend(record.clone());
                info!("✅ {} created: {}", kind, record.id);
                self.inner
                    .notifier
                    .notify(Notification::success(format!("{} created successfully", kind.display_name())));
                self.inner.events.emit(event_builders::record_created(kind, &record.id)).await;
                self.schedule_stats_refresh();
                Ok(record)
            }
            Err(e) => {
                error!("❌ create {} failed: {}", kind, e);
                self.inner
                    .notifier
                    .notify(Notification::failure(format!("Failed to create {}", self.noun()), &e));
                Err(e)
            }
        }
    }

    /// 更新：服务端确认后按 id 原位替换
    pub async fn update(&self, id: &str, payload: Value) -> Result<EntityRecord> {
        let kind = self.inner.kind;
        let result = {
            let _guard = InFlightGuard::new(&self.inner, Mutation::Update);
            self.fetch_canonical(self.inner.service.update(id, payload).await)
                .and_then(|record| {
                    if record.id == id {
                        Ok(record)
                    } else {
                        Err(DealerSDKError::MalformedResponse(format!(
                            "update of {} returned record {}",
                            id, record.id
                        )))
                    }
                })
        };

        match result {
            Ok(record) => {
                let replaced = self.inner.state.lock().collection.replace(record.clone());
                if !replaced {
                    debug!("updated {} {} is not on the current page", kind, id);
                }
                info!("✅ {} updated: {}", kind, id);
                self.inner
                    .notifier
                    .notify(Notification::success(format!("{} updated successfully", kind.display_name())));
                self.inner.events.emit(event_builders::record_updated(kind, id)).await;
                self.schedule_stats_refresh();
                Ok(record)
            }
            Err(e) => {
                error!("❌ update {} {} failed: {}", kind, id, e);
                self.inner
                    .notifier
                    .notify(Notification::failure(format!("Failed to update {}", self.noun()), &e));
                Err(e)
            }
        }
    }

    /// 删除：不可逆，服务端确认后才从列表移除
    pub async fn delete(&self, id: &str) -> Result<()> {
        let kind = self.inner.kind;
        let result = {
            let _guard = InFlightGuard::new(&self.inner, Mutation::Delete);
            self.inner.service.delete(id).await
        };

        match result {
            Ok(()) => {
                self.inner.state.lock().collection.remove(id);
                info!("✅ {} deleted: {}", kind, id);
                self.inner
                    .notifier
                    .notify(Notification::success(format!("{} deleted successfully", kind.display_name())));
                self.inner.events.emit(event_builders::record_deleted(kind, id)).await;
                self.schedule_stats_refresh();
                Ok(())
            }
            Err(e) => {
                error!("❌ delete {} {} failed: {}", kind, id, e);
                self.inner
                    .notifier
                    .notify(Notification::failure(format!("Failed to delete {}", self.noun()), &e));
                Err(e)
            }
        }
    }

    /// 开关切换（乐观）
    ///
    /// 先改本地再请求；成功时服务端字段覆盖本地，失败时恢复切换前快照；
    /// 响应不可信时丢弃乐观值并整页重拉。同一记录的并发切换以最后一次为准：
    /// 被取代的旧请求无论成败都不再改本地状态。
    pub async fn toggle_status(&self, record: &EntityRecord, value: bool) -> Result<ToggleOutcome> {
        let kind = self.inner.kind;
        let field = match self.toggle_field() {
            Some(field) => field.to_string(),
            None => {
                return Err(DealerSDKError::InvalidOperation(format!(
                    "{} has no status toggle",
                    kind
                )))
            }
        };
        let id = record.id.clone();

        let (snapshot, generation) = {
            let mut state = self.inner.state.lock();
            state.next_toggle_generation += 1;
            let generation = state.next_toggle_generation;
            state.toggle_generations.insert(id.clone(), generation);
            let snapshot = state
                .collection
                .set_field(&id, &field, Value::Bool(value))
                .unwrap_or_else(|| record.clone());
            (snapshot, generation)
        };
        debug!("toggle {} {}.{} -> {} (gen {})", kind, id, field, value, generation);

        let result = {
            let _guard = InFlightGuard::new(&self.inner, Mutation::Toggle);
            self.inner.service.update_status(&id, &field, value).await
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let rolled_back = self.settle_toggle(&id, generation, |collection| {
                    collection.replace(snapshot.clone());
                });
                if rolled_back {
                    warn!("toggle {} {} failed, rolled back: {}", kind, id, e);
                    self.inner
                        .events
                        .emit(event_builders::toggle_rolled_back(kind, &id, e.user_message()))
                        .await;
                } else {
                    debug!("toggle {} {} gen {} failed after being superseded", kind, id, generation);
                }
                error!("❌ toggle {} {} failed: {}", kind, id, e);
                self.inner.notifier.notify(Notification::failure(
                    format!("Failed to update {} status", self.noun()),
                    &e,
                ));
                return Err(e);
            }
        };

        let server = unwrap_record(response, kind.record_key())
            .ok()
            .filter(|object| {
                let server_id = object
                    .get("id")
                    .or_else(|| object.get("_id"))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                server_id.as_deref() == Some(id.as_str())
            });

        let Some(server) = server else {
            warn!("toggle {} {} returned an unusable record, refetching", kind, id);
            self.settle_toggle(&id, generation, |collection| {
                collection.replace(snapshot.clone());
            });
            let outcome = self.list().await;
            self.schedule_stats_refresh();
            return Ok(ToggleOutcome::Refetched(outcome));
        };

        let mut merged = snapshot.clone();
        merged.set(&field, Value::Bool(value));
        merged.merge_from(&server);
        let applied = self.settle_toggle(&id, generation, |collection| {
            collection.replace(merged.clone());
        });
        if !applied {
            debug!("toggle {} {} gen {} confirmed after being superseded", kind, id, generation);
        }

        let confirmed = merged.bool_field(&field).unwrap_or(value);
        info!("✅ {} {} {} = {}", kind, id, field, confirmed);
        self.inner.notifier.notify(Notification::success(format!(
            "{} {}",
            kind.display_name(),
            if confirmed { "activated" } else { "deactivated" }
        )));
        self.inner
            .events
            .emit(event_builders::status_toggled(kind, &id, confirmed))
            .await;
        self.schedule_stats_refresh();
        Ok(ToggleOutcome::Confirmed(merged))
    }

    /// 切换结束：仅当该代号仍是这条记录的最新切换时才改本地
    fn settle_toggle(
        &self,
        id: &str,
        generation: u64,
        apply: impl FnOnce(&mut CollectionState),
    ) -> bool {
        let mut state = self.inner.state.lock();
        if state.toggle_generations.get(id) != Some(&generation) {
            return false;
        }
        state.toggle_generations.remove(id);
        apply(&mut state.collection);
        true
    }

    fn fetch_canonical(&self, response: Result<Value>) -> Result<EntityRecord> {
        let object = unwrap_record(response?, self.inner.kind.record_key())?;
        EntityRecord::from_canonical_value(Value::Object(object))
    }

    fn noun(&self) -> String {
        self.inner.kind.display_name().to_lowercase()
    }

    // ========== 统计 ==========

    /// 后台刷新统计，不影响列表的 loading，也不会让列表失败
    ///
    /// NOTE: 需要在 tokio runtime 内调用；不在 runtime 内时只打 warn 并跳过。
    pub(crate) fn schedule_stats_refresh(&self) {
        if !self.inner.config.stats_enabled {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("stats refresh for {} skipped, no tokio runtime: {}", self.inner.kind, e);
                return;
            }
        };
        let engine = self.clone();
        let handle = runtime.spawn(async move {
            engine.refresh_stats().await;
        });
        let mut tasks = self.inner.stats_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// 立即刷新统计；失败时保留上一次的值并返回 None
    pub async fn refresh_stats(&self) -> Option<StatsView> {
        let kind = self.inner.kind;
        let tag = self.inner.stats_seq.issue();

        let result = match self.inner.service.get_stats().await {
            Ok(response) => normalize_stats(response).map_err(DealerSDKError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(mut stats) => {
                stats.fetched_at = Some(Utc::now());
                let applied = {
                    let mut state = self.inner.state.lock();
                    let current = self.inner.stats_seq.is_current(tag);
                    if current {
                        state.stats = Some(stats.clone());
                    }
                    current
                };
                if !applied {
                    debug!("stats {} #{} superseded", kind, tag);
                    return None;
                }
                self.inner
                    .events
                    .emit(event_builders::stats_refreshed(kind, stats.total))
                    .await;
                Some(stats)
            }
            Err(e) => {
                warn!("stats {} refresh failed, keeping last value: {}", kind, e);
                None
            }
        }
    }

    /// 等待所有已调度的统计刷新结束
    pub async fn wait_for_stats(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.stats_tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!("stats task for {} aborted: {}", self.inner.kind, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotificationSink;
    use crate::sync::mock::{MockCollectionService, MockOp};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        engine: EntitySyncEngine,
        service: Arc<MockCollectionService>,
        sink: MemoryNotificationSink,
    }

    fn harness_with(kind: EntityKind, config: SyncConfig, service: MockCollectionService) -> Harness {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let service = Arc::new(service);
        let sink = MemoryNotificationSink::new();
        let engine = EntitySyncEngine::new(
            kind,
            config,
            service.clone(),
            Arc::new(sink.clone()),
            Arc::new(EventManager::new(64)),
        );
        Harness { engine, service, sink }
    }

    fn harness(records: Vec<Value>) -> Harness {
        harness_with(
            EntityKind::Model,
            SyncConfig::default(),
            MockCollectionService::with_records(records),
        )
    }

    fn active_config() -> SyncConfig {
        SyncConfig {
            toggle_field: Some("active".to_string()),
            ..SyncConfig::default()
        }
    }

    fn models(count: usize) -> Vec<Value> {
        (1..=count)
            .map(|i| json!({"id": i.to_string(), "name": format!("Model {}", i), "createdAt": "2024-01-01"}))
            .collect()
    }

    fn assert_unique_ids(engine: &EntitySyncEngine) {
        let items = engine.items();
        let mut ids: Vec<_> = items.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), items.len(), "duplicate ids in {:?}", items);
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let h = harness(models(15));
        assert!(h.engine.mount().await.is_loaded());
        let first = h.engine.snapshot();
        assert!(h.engine.list().await.is_loaded());
        let second = h.engine.snapshot();

        assert_eq!(first.data, second.data);
        assert_eq!(first.pagination, second.pagination);
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.pagination.page_count, 2);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_prev);
        assert_eq!(first.phase, LoadPhase::Ready);
        assert!(!first.is_loading);
    }

    #[tokio::test]
    async fn test_pagination_is_recomputed_from_response() {
        let h = harness(models(0));
        // 服务端给的 pages/hasNext 与 total 不一致时以 total 为准
        h.service.script(
            MockOp::List,
            Ok(json!({
                "data": models(2),
                "pagination": {"page": 2, "limit": 2, "total": 7, "pages": 1, "hasNext": false, "hasPrev": false}
            })),
        );
        h.engine.list().await;
        let p = h.engine.snapshot().pagination;
        assert_eq!(p.page_count, 4);
        assert!(p.has_next);
        assert!(p.has_prev);
    }

    #[tokio::test]
    async fn test_filter_changes_reset_page() {
        let h = harness(models(35));
        h.engine.mount().await;
        h.engine.go_to_page(3).await;
        assert_eq!(h.engine.snapshot().pagination.page, 3);

        h.engine.set_search("model").await;
        assert_eq!(h.engine.snapshot().pagination.page, 1);
        assert_eq!(h.service.last_list_params().unwrap().page, 1);

        h.engine.go_to_page(2).await;
        h.engine.set_filter("name", "Model 1").await;
        assert_eq!(h.engine.snapshot().pagination.page, 1);

        h.engine.clear_filter("name").await;
        h.engine.go_to_page(4).await;
        h.engine.set_sort("name", SortOrder::Asc).await;
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.pagination.page, 1);
        assert_eq!(snapshot.filters.sort_by.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn test_page_navigation() {
        let h = harness(models(25));
        h.engine.mount().await;

        assert_eq!(h.engine.prev_page().await, ListOutcome::Skipped);
        assert!(h.engine.next_page().await.is_loaded());
        assert!(h.engine.next_page().await.is_loaded());
        assert_eq!(h.engine.snapshot().pagination.page, 3);
        assert_eq!(h.engine.next_page().await, ListOutcome::Skipped);

        // 越界跳页被截断到最后一页
        h.engine.go_to_page(99).await;
        assert_eq!(h.engine.snapshot().pagination.page, 3);

        h.engine.set_page_size(20).await;
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.pagination.page, 1);
        assert_eq!(snapshot.pagination.limit, 20);
        assert_eq!(snapshot.data.len(), 20);
    }

    #[tokio::test]
    async fn test_go_to_page_before_first_load_is_not_clamped() {
        let h = harness(models(35));
        h.engine.go_to_page(3).await;

        assert_eq!(h.service.last_list_params().unwrap().page, 3);
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.pagination.page, 3);
        assert_eq!(snapshot.data[0].id, "21");

        // 有了成功响应后才按 page_count 截断
        h.engine.go_to_page(9).await;
        assert_eq!(h.service.last_list_params().unwrap().page, 4);
    }

    #[tokio::test]
    async fn test_go_to_page_after_failed_load_is_not_clamped() {
        let h = harness(models(35));
        h.service
            .script(MockOp::List, Err(DealerSDKError::Transport("offline".into())));
        h.engine.list().await;
        h.engine.go_to_page(2).await;
        assert_eq!(h.service.last_list_params().unwrap().page, 2);
        assert_eq!(h.engine.snapshot().pagination.page, 2);
    }

    #[tokio::test]
    async fn test_refresh_resets_filters() {
        let h = harness(models(12));
        h.engine.mount().await;
        h.engine.set_search("Model 1").await;
        h.engine.set_filter("make", "m1").await;
        h.engine.refresh().await;

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.filters, SyncConfig::default().default_filters());
        assert_eq!(snapshot.pagination.page, 1);
        assert_eq!(snapshot.data.len(), 10);
    }

    #[tokio::test]
    async fn test_list_failure_clears_items_and_notifies() {
        let h = harness(models(3));
        h.engine.mount().await;
        assert_eq!(h.engine.items().len(), 3);

        h.service
            .script(MockOp::List, Err(DealerSDKError::Transport("connection reset".into())));
        let outcome = h.engine.list().await;
        assert!(matches!(outcome, ListOutcome::Failed(DealerSDKError::Transport(_))));

        let snapshot = h.engine.snapshot();
        assert!(snapshot.data.is_empty());
        assert_eq!(snapshot.error.as_deref(), Some("connection reset"));
        assert_eq!(snapshot.phase, LoadPhase::Failed);
        assert_eq!(h.sink.errors().len(), 1);

        // 下一次成功会清掉 error
        h.engine.list().await;
        assert!(h.engine.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_malformed_list_is_a_fetch_failure() {
        let h = harness(models(0));
        h.service.script(MockOp::List, Ok(json!({"data": {"unexpected": []}})));
        assert!(matches!(
            h.engine.list().await,
            ListOutcome::Failed(DealerSDKError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_nested_envelope() {
        let h = harness_with(
            EntityKind::Model,
            SyncConfig::default(),
            MockCollectionService::with_records(models(4)).nested("models"),
        );
        assert_eq!(h.engine.mount().await, ListOutcome::Loaded { items: 4, total: 4 });
    }

    #[tokio::test]
    async fn test_stale_list_response_is_discarded() {
        let h = harness(vec![
            json!({"id": "1", "name": "Old Civic"}),
            json!({"id": "2", "name": "New Accord"}),
        ]);
        let gate = h.service.hold_next(MockOp::List);

        let engine = h.engine.clone();
        let slow = tokio::spawn(async move { engine.set_search("old").await });
        gate.entered.await.unwrap();

        let fast = h.engine.set_search("new").await;
        assert_eq!(fast, ListOutcome::Loaded { items: 1, total: 1 });

        gate.release.send(()).unwrap();
        assert_eq!(slow.await.unwrap(), ListOutcome::Superseded);

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data[0].id, "2");
        assert_eq!(snapshot.filters.search, "new");
    }

    #[tokio::test]
    async fn test_create_prepends_and_refreshes_stats() {
        let h = harness(Vec::new());
        h.engine.mount().await;
        h.engine.wait_for_stats().await;
        let stats_calls = h.service.calls(MockOp::Stats);

        h.service.script(
            MockOp::Create,
            Ok(json!({"id": "1", "name": "Civic", "createdAt": "2024-01-01"})),
        );
        let created = assert_ok!(h.engine.create(json!({"name": "Civic"})).await);
        assert_eq!(created.id, "1");

        let items = h.engine.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "1");
        assert_eq!(items[0].str_field("name"), Some("Civic"));

        h.engine.wait_for_stats().await;
        assert_eq!(h.service.calls(MockOp::Stats), stats_calls + 1);
        let successes = h.sink.successes();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].title, "Model created successfully");
    }

    #[tokio::test]
    async fn test_create_without_canonical_shape_fails() {
        let h = harness(Vec::new());
        h.engine.mount().await;
        h.service.script(MockOp::Create, Ok(json!({"success": true, "data": {"name": "Civic"}})));
        let err = assert_err!(h.engine.create(json!({"name": "Civic"})).await);
        assert!(matches!(err, DealerSDKError::MalformedResponse(_)));
        assert!(h.engine.items().is_empty());
        assert_eq!(h.sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_items() {
        let h = harness(models(2));
        h.engine.mount().await;
        h.service
            .script(MockOp::Create, Err(DealerSDKError::from_status(422, "name is required")));
        let err = assert_err!(h.engine.create(json!({})).await);
        assert_eq!(err.status(), Some(422));
        assert_eq!(h.engine.items().len(), 2);
        assert_eq!(
            h.sink.errors()[0].description.as_deref(),
            Some("name is required")
        );
    }

    #[tokio::test]
    async fn test_update_replaces_by_id() {
        let h = harness(models(3));
        h.engine.mount().await;
        let updated = assert_ok!(h.engine.update("2", json!({"name": "Renamed"})).await);
        assert_eq!(updated.updated_at.as_deref(), Some("2024-01-02T00:00:00Z"));

        let items = h.engine.items();
        assert_eq!(items.len(), 3);
        assert_eq!(h.engine.get("2").unwrap().str_field("name"), Some("Renamed"));
        assert_unique_ids(&h.engine);
    }

    #[tokio::test]
    async fn test_update_failure_leaves_items_untouched() {
        let h = harness(models(2));
        h.engine.mount().await;
        let before = h.engine.items();
        h.service.script(MockOp::Update, Err(DealerSDKError::from_status(500, "boom")));
        assert_err!(h.engine.update("1", json!({"name": "x"})).await);
        assert_eq!(h.engine.items(), before);
    }

    #[tokio::test]
    async fn test_delete_removes_after_commit() {
        let h = harness(models(2));
        h.engine.mount().await;
        assert_ok!(h.engine.delete("1").await);
        let items = h.engine.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_item_and_rejects() {
        let h = harness(vec![json!({"id": "1"})]);
        h.engine.mount().await;
        h.service
            .script(MockOp::Delete, Err(DealerSDKError::from_status(409, "vehicle has sales")));

        let err = assert_err!(h.engine.delete("1").await);
        assert_eq!(err.user_message(), "vehicle has sales");
        let items = h.engine.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "1");
        assert_eq!(h.sink.errors().len(), 1);
        assert_eq!(h.sink.errors()[0].title, "Failed to delete model");
    }

    #[tokio::test]
    async fn test_no_duplicate_ids_after_mixed_mutations() {
        let h = harness(models(3));
        h.engine.mount().await;
        h.engine.create(json!({"name": "A"})).await.unwrap();
        // 服务端重复返回已有 id 也不会产生重复
        h.service.script(MockOp::Create, Ok(json!({"id": "2", "createdAt": "2024-01-05"})));
        h.engine.create(json!({"name": "B"})).await.unwrap();
        h.engine.update("1", json!({"name": "C"})).await.unwrap();
        h.engine.delete("3").await.unwrap();
        assert_unique_ids(&h.engine);
        assert_eq!(h.engine.items()[0].id, "2");
    }

    #[tokio::test]
    async fn test_toggle_success_merges_server_record() {
        let h = harness_with(
            EntityKind::Make,
            active_config(),
            MockCollectionService::with_records(vec![
                json!({"id": "1", "active": false, "createdAt": "2024-01-01"}),
            ]),
        );
        h.engine.mount().await;
        let record = h.engine.get("1").unwrap();

        let gate = h.service.hold_next(MockOp::UpdateStatus);
        h.service.script(
            MockOp::UpdateStatus,
            Ok(json!({"id": "1", "active": true, "updatedAt": "t2"})),
        );
        let engine = h.engine.clone();
        let task = tokio::spawn(async move { engine.toggle_status(&record, true).await });

        gate.entered.await.unwrap();
        // 请求未返回前已经是乐观值
        assert_eq!(h.engine.get("1").unwrap().bool_field("active"), Some(true));
        assert!(h.engine.snapshot().mutations.toggling);

        gate.release.send(()).unwrap();
        let outcome = task.await.unwrap().unwrap();
        let merged = h.engine.get("1").unwrap();
        assert_eq!(outcome, ToggleOutcome::Confirmed(merged.clone()));
        assert_eq!(merged.bool_field("active"), Some(true));
        assert_eq!(merged.updated_at.as_deref(), Some("t2"));
        assert!(!h.engine.snapshot().mutations.toggling);
    }

    #[tokio::test]
    async fn test_toggle_failure_rolls_back_to_snapshot() {
        let h = harness_with(
            EntityKind::Make,
            active_config(),
            MockCollectionService::with_records(vec![json!({
                "id": "1", "active": false, "name": "Honda", "createdAt": "2024-01-01"
            })]),
        );
        h.engine.mount().await;
        h.engine.wait_for_stats().await;
        let original = h.engine.get("1").unwrap();
        let mut events = h.engine.subscribe();

        h.service
            .script(MockOp::UpdateStatus, Err(DealerSDKError::Transport("timeout".into())));
        assert_err!(h.engine.toggle_status(&original, true).await);

        assert_eq!(h.engine.get("1").unwrap(), original);
        assert_eq!(h.sink.errors().len(), 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::ToggleRolledBack { ref id, .. } if id == "1"
        ));
        // 不自动重试
        assert_eq!(h.service.calls(MockOp::UpdateStatus), 1);
    }

    #[tokio::test]
    async fn test_toggle_malformed_response_refetches() {
        let h = harness_with(
            EntityKind::Make,
            active_config(),
            MockCollectionService::with_records(vec![
                json!({"id": "1", "active": false, "createdAt": "2024-01-01"}),
            ]),
        );
        h.engine.mount().await;
        let record = h.engine.get("1").unwrap();
        let list_calls = h.service.calls(MockOp::List);

        h.service.script(MockOp::UpdateStatus, Ok(Value::Null));
        let outcome = assert_ok!(h.engine.toggle_status(&record, true).await);
        assert!(matches!(outcome, ToggleOutcome::Refetched(ListOutcome::Loaded { .. })));
        assert_eq!(h.service.calls(MockOp::List), list_calls + 1);
        // 列表来自服务端（mock 没有真正修改），不是未经确认的乐观值
        assert_eq!(h.engine.get("1").unwrap().bool_field("active"), Some(false));
    }

    #[tokio::test]
    async fn test_toggle_response_without_id_refetches() {
        let h = harness_with(
            EntityKind::Make,
            active_config(),
            MockCollectionService::with_records(vec![json!({"id": "1", "active": false})]),
        );
        h.engine.mount().await;
        let record = h.engine.get("1").unwrap();
        let list_calls = h.service.calls(MockOp::List);

        h.service
            .script(MockOp::UpdateStatus, Ok(json!({"success": true, "data": {"active": true}})));
        let outcome = assert_ok!(h.engine.toggle_status(&record, true).await);
        assert!(matches!(outcome, ToggleOutcome::Refetched(_)));
        assert_eq!(h.service.calls(MockOp::List), list_calls + 1);
    }

    #[tokio::test]
    async fn test_superseded_toggle_failure_keeps_newer_value() {
        let h = harness_with(
            EntityKind::Make,
            active_config(),
            MockCollectionService::with_records(vec![json!({"id": "1", "active": false})]),
        );
        h.engine.mount().await;
        let record = h.engine.get("1").unwrap();

        let gate = h.service.hold_next(MockOp::UpdateStatus);
        h.service
            .script(MockOp::UpdateStatus, Err(DealerSDKError::Transport("timeout".into())));
        let engine = h.engine.clone();
        let first_record = record.clone();
        let first = tokio::spawn(async move { engine.toggle_status(&first_record, true).await });
        gate.entered.await.unwrap();

        // 第二次切换（回到 false）先完成
        let second = assert_ok!(h.engine.toggle_status(&record, false).await);
        assert!(matches!(second, ToggleOutcome::Confirmed(_)));

        gate.release.send(()).unwrap();
        assert!(first.await.unwrap().is_err());
        assert_eq!(h.engine.get("1").unwrap().bool_field("active"), Some(false));
    }

    #[tokio::test]
    async fn test_toggle_unsupported_kind() {
        let h = harness_with(EntityKind::Sale, SyncConfig::default(), MockCollectionService::new());
        let record = EntityRecord::new("1", "2024-01-01");
        let err = assert_err!(h.engine.toggle_status(&record, true).await);
        assert!(matches!(err, DealerSDKError::InvalidOperation(_)));
        assert_eq!(h.service.calls(MockOp::UpdateStatus), 0);
    }

    #[tokio::test]
    async fn test_toggle_uses_kind_field_by_default() {
        let h = harness_with(
            EntityKind::Vehicle,
            SyncConfig::default(),
            MockCollectionService::with_records(vec![json!({"id": "v1", "isActive": true})]),
        );
        h.engine.mount().await;
        let record = h.engine.get("v1").unwrap();
        let outcome = assert_ok!(h.engine.toggle_status(&record, false).await);
        match outcome {
            ToggleOutcome::Confirmed(merged) => {
                assert_eq!(merged.bool_field("isActive"), Some(false));
                assert_eq!(merged.updated_at.as_deref(), Some("2024-01-02T00:00:00Z"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.sink.successes().last().unwrap().title, "Vehicle deactivated");
    }

    #[tokio::test]
    async fn test_stats_failure_keeps_last_value() {
        let h = harness(vec![json!({"id": "1", "isActive": true})]);
        h.engine.mount().await;
        h.engine.wait_for_stats().await;
        let stats = h.engine.stats().unwrap();
        assert_eq!((stats.total, stats.active), (1, 1));

        h.service.script(MockOp::Stats, Err(DealerSDKError::from_status(500, "stats down")));
        assert!(h.engine.refresh_stats().await.is_none());
        assert_eq!(h.engine.stats().unwrap().total, 1);
        // 统计失败不影响列表，也不弹通知
        assert!(h.engine.snapshot().error.is_none());
        assert!(h.sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_stale_stats_response_is_discarded() {
        let h = harness(vec![json!({"id": "1", "isActive": true})]);
        let gate = h.service.hold_next(MockOp::Stats);
        h.service.script(
            MockOp::Stats,
            Ok(json!({"data": {"total": 1, "active": 1, "inactive": 0}})),
        );

        let engine = h.engine.clone();
        let slow = tokio::spawn(async move { engine.refresh_stats().await });
        gate.entered.await.unwrap();

        h.service.script(
            MockOp::Stats,
            Ok(json!({"data": {"total": 2, "active": 1, "inactive": 1}})),
        );
        let fresh = h.engine.refresh_stats().await.unwrap();
        assert_eq!(fresh.total, 2);

        gate.release.send(()).unwrap();
        assert!(slow.await.unwrap().is_none());
        assert_eq!(h.engine.stats().unwrap().total, 2);
    }

    #[test]
    fn test_stats_refresh_outside_runtime_is_skipped() {
        let h = harness(models(1));
        h.engine.schedule_stats_refresh();
        assert!(h.engine.inner.stats_tasks.lock().is_empty());
        assert_eq!(h.service.calls(MockOp::Stats), 0);
    }

    #[tokio::test]
    async fn test_stats_disabled() {
        let config = SyncConfig {
            stats_enabled: false,
            ..SyncConfig::default()
        };
        let h = harness_with(EntityKind::Make, config, MockCollectionService::with_records(models(1)));
        h.engine.mount().await;
        h.engine.create(json!({"name": "x"})).await.unwrap();
        h.engine.wait_for_stats().await;
        assert_eq!(h.service.calls(MockOp::Stats), 0);
        assert!(h.engine.stats().is_none());
    }

    #[tokio::test]
    async fn test_events_follow_mutations() {
        let h = harness(models(1));
        let mut events = h.engine.subscribe();
        h.engine.mount().await;
        h.engine.delete("1").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event.event_type());
        }
        assert!(seen.contains(&"list_loaded"));
        assert!(seen.contains(&"record_deleted"));
    }
}
