//! 测试用内存服务端
//!
//! 默认行为是一个最小的内存 REST 后端；`script` 可以插入指定响应，
//! `hold_next` 可以把某次调用卡住，用来构造请求乱序。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

use crate::error::{DealerSDKError, Result};
use crate::query::ListParams;
use crate::service::RemoteCollectionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    List,
    Create,
    Update,
    Delete,
    UpdateStatus,
    Stats,
}

/// 调用进入服务端时 `entered` 收到通知；`release` 放行
pub struct Gate {
    pub entered: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

type HeldCall = (oneshot::Sender<()>, oneshot::Receiver<()>);

#[derive(Default)]
struct MockInner {
    store: Vec<Value>,
    next_id: u64,
    scripted: HashMap<MockOp, VecDeque<Result<Value>>>,
    gates: HashMap<MockOp, VecDeque<HeldCall>>,
    calls: HashMap<MockOp, usize>,
    list_params: Vec<ListParams>,
}

#[derive(Default)]
pub struct MockCollectionService {
    inner: Mutex<MockInner>,
    /// 设置后列表响应使用 `{data: {<key>: [...], pagination}}`
    nested_key: Option<String>,
}

impl MockCollectionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Value>) -> Self {
        let service = Self::new();
        {
            let mut inner = service.inner.lock();
            inner.next_id = records.len() as u64;
            inner.store = records;
        }
        service
    }

    pub fn nested(mut self, key: &str) -> Self {
        self.nested_key = Some(key.to_string());
        self
    }

    /// 下一次 `op` 调用直接返回给定结果
    pub fn script(&self, op: MockOp, response: Result<Value>) {
        self.inner.lock().scripted.entry(op).or_default().push_back(response);
    }

    /// 卡住下一次 `op` 调用
    pub fn hold_next(&self, op: MockOp) -> Gate {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.inner
            .lock()
            .gates
            .entry(op)
            .or_default()
            .push_back((entered_tx, release_rx));
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn last_list_params(&self) -> Option<ListParams> {
        self.inner.lock().list_params.last().cloned()
    }

    pub fn store(&self) -> Vec<Value> {
        self.inner.lock().store.clone()
    }

    async fn enter(&self, op: MockOp) -> Option<Result<Value>> {
        let (gate, scripted) = {
            let mut inner = self.inner.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            let gate = inner.gates.get_mut(&op).and_then(VecDeque::pop_front);
            let scripted = inner.scripted.get_mut(&op).and_then(VecDeque::pop_front);
            (gate, scripted)
        };
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        scripted
    }

    fn find_index(store: &[Value], id: &str) -> Option<usize> {
        store.iter().position(|v| v.get("id").and_then(Value::as_str) == Some(id))
    }

    fn matches(record: &Value, params: &ListParams) -> bool {
        if let Some(search) = &params.search {
            let name = record.get("name").and_then(Value::as_str).unwrap_or("");
            if !name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        params.filters.iter().all(|(key, expected)| match record.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        })
    }
}

fn merge_payload(target: &mut Value, payload: Value) {
    if let (Some(target), Value::Object(fields)) = (target.as_object_mut(), payload) {
        for (key, value) in fields {
            if key != "id" {
                target.insert(key, value);
            }
        }
    }
}

#[async_trait]
impl RemoteCollectionService for MockCollectionService {
    async fn list(&self, params: &ListParams) -> Result<Value> {
        self.inner.lock().list_params.push(params.clone());
        if let Some(scripted) = self.enter(MockOp::List).await {
            return scripted;
        }

        let inner = self.inner.lock();
        let matched: Vec<Value> = inner
            .store
            .iter()
            .filter(|r| Self::matches(r, params))
            .cloned()
            .collect();
        let total = matched.len() as u64;
        let limit = params.limit.max(1) as usize;
        let start = (params.page.max(1) as usize - 1) * limit;
        let page: Vec<Value> = matched.into_iter().skip(start).take(limit).collect();
        let pages = total.div_ceil(limit as u64);
        let pagination = json!({
            "page": params.page,
            "limit": params.limit,
            "total": total,
            "pages": pages,
            "hasNext": u64::from(params.page) < pages,
            "hasPrev": params.page > 1,
        });

        Ok(match &self.nested_key {
            Some(key) => {
                let mut data = Map::new();
                data.insert(key.clone(), Value::Array(page));
                data.insert("pagination".to_string(), pagination);
                json!({ "success": true, "data": data })
            }
            None => json!({ "success": true, "data": page, "pagination": pagination }),
        })
    }

    async fn create(&self, payload: Value) -> Result<Value> {
        if let Some(scripted) = self.enter(MockOp::Create).await {
            return scripted;
        }
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let mut record = json!({
            "id": inner.next_id.to_string(),
            "createdAt": "2024-01-01T00:00:00Z",
        });
        merge_payload(&mut record, payload);
        inner.store.insert(0, record.clone());
        Ok(json!({ "success": true, "data": record }))
    }

    async fn update(&self, id: &str, payload: Value) -> Result<Value> {
        if let Some(scripted) = self.enter(MockOp::Update).await {
            return scripted;
        }
        let mut inner = self.inner.lock();
        let index = Self::find_index(&inner.store, id)
            .ok_or_else(|| DealerSDKError::from_status(404, format!("{} not found", id)))?;
        let record = &mut inner.store[index];
        merge_payload(record, payload);
        record["updatedAt"] = json!("2024-01-02T00:00:00Z");
        Ok(json!({ "success": true, "data": record.clone() }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if let Some(scripted) = self.enter(MockOp::Delete).await {
            return scripted.map(|_| ());
        }
        let mut inner = self.inner.lock();
        let index = Self::find_index(&inner.store, id)
            .ok_or_else(|| DealerSDKError::from_status(404, format!("{} not found", id)))?;
        inner.store.remove(index);
        Ok(())
    }

    async fn update_status(&self, id: &str, field: &str, value: bool) -> Result<Value> {
        if let Some(scripted) = self.enter(MockOp::UpdateStatus).await {
            return scripted;
        }
        let mut inner = self.inner.lock();
        let index = Self::find_index(&inner.store, id)
            .ok_or_else(|| DealerSDKError::from_status(404, format!("{} not found", id)))?;
        let record = &mut inner.store[index];
        record[field] = Value::Bool(value);
        record["updatedAt"] = json!("2024-01-02T00:00:00Z");
        Ok(json!({ "success": true, "data": record.clone() }))
    }

    async fn get_stats(&self) -> Result<Value> {
        if let Some(scripted) = self.enter(MockOp::Stats).await {
            return scripted;
        }
        let inner = self.inner.lock();
        let total = inner.store.len();
        let active = inner
            .store
            .iter()
            .filter(|r| {
                r.get("isActive").and_then(Value::as_bool).unwrap_or(false)
                    || r.get("active").and_then(Value::as_bool).unwrap_or(false)
            })
            .count();
        Ok(json!({
            "success": true,
            "data": { "total": total, "active": active, "inactive": total - active }
        }))
    }
}
