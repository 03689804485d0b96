//! 集合镜像状态
//!
//! `items` 只由两类操作改写：整页替换（列表响应）和按 id 的单条变更。
//! 所有写入都保持 id 唯一。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityRecord;

/// 列表加载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPhase {
    /// 尚未加载
    Idle,
    Loading,
    Ready,
    Failed,
}

/// 客户端集合镜像
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    /// 服务端顺序，不在客户端重排
    pub items: Vec<EntityRecord>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub phase: LoadPhase,
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            is_loading: false,
            error: None,
            phase: LoadPhase::Idle,
        }
    }
}

impl CollectionState {
    pub fn begin_loading(&mut self) {
        self.is_loading = true;
        self.phase = LoadPhase::Loading;
    }

    /// 列表成功：整页替换
    pub fn replace_all(&mut self, items: Vec<EntityRecord>) {
        self.items = items;
        self.is_loading = false;
        self.error = None;
        self.phase = LoadPhase::Ready;
    }

    /// 列表失败：清空，不展示旧数据
    pub fn fail(&mut self, error: String) {
        self.items.clear();
        self.is_loading = false;
        self.error = Some(error);
        self.phase = LoadPhase::Failed;
    }

    pub fn find(&self, id: &str) -> Option<&EntityRecord> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }

    /// 插到最前面；已存在同 id 的记录先移除
    pub fn prepend(&mut self, record: EntityRecord) {
        self.items.retain(|r| r.id != record.id);
        self.items.insert(0, record);
    }

    /// 按 id 原位替换，返回是否命中
    pub fn replace(&mut self, record: EntityRecord) -> bool {
        match self.position(&record.id) {
            Some(index) => {
                self.items[index] = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<EntityRecord> {
        let index = self.position(id)?;
        Some(self.items.remove(index))
    }

    /// 原位改一个字段，返回改之前的完整记录
    pub fn set_field(&mut self, id: &str, field: &str, value: Value) -> Option<EntityRecord> {
        let index = self.position(id)?;
        let before = self.items[index].clone();
        self.items[index].set(field, value);
        Some(before)
    }

    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.items.len());
        self.items.iter().any(|r| !seen.insert(r.id.as_str()))
    }
}

/// 各类变更的进行中计数；变更之间可以重叠
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub creating: u32,
    pub updating: u32,
    pub deleting: u32,
    pub toggling: u32,
}

/// 暴露给表单/对话框的 loading 标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationFlags {
    pub creating: bool,
    pub updating: bool,
    pub deleting: bool,
    pub toggling: bool,
}

impl MutationFlags {
    pub fn any(&self) -> bool {
        self.creating || self.updating || self.deleting || self.toggling
    }
}

impl From<InFlight> for MutationFlags {
    fn from(in_flight: InFlight) -> Self {
        Self {
            creating: in_flight.creating > 0,
            updating: in_flight.updating > 0,
            deleting: in_flight.deleting > 0,
            toggling: in_flight.toggling > 0,
        }
    }
}
