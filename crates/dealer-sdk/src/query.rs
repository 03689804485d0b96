//! 列表查询状态：筛选、排序、分页
//!
//! 两条硬约束：
//! - 任何筛选/搜索/排序变化都把页码重置为 1
//! - `page_count`/`has_next`/`has_prev` 只由最新响应计算，不手工维护

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// 筛选状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// 搜索关键字（空串表示不搜索）
    pub search: String,
    /// 字段筛选：status / make / vehicleType ……
    pub filters: BTreeMap<String, String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            filters: BTreeMap::new(),
            sort_by: Some("createdAt".to_string()),
            sort_order: SortOrder::Desc,
        }
    }
}

impl FilterState {
    pub fn with_sort(sort_by: Option<String>, sort_order: SortOrder) -> Self {
        Self {
            sort_by,
            sort_order,
            ..Self::default()
        }
    }

    pub fn is_filtered(&self) -> bool {
        !self.search.trim().is_empty() || !self.filters.is_empty()
    }
}

/// 分页状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    /// 从 1 开始
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub page_count: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationState {
    /// 引擎创建时的空状态
    pub fn empty(limit: u32) -> Self {
        Self::computed(1, limit, 0)
    }

    /// 由 page/limit/total 推导其余字段
    pub fn computed(page: u32, limit: u32, total: u64) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let page_count = total.div_ceil(u64::from(limit)).min(u64::from(u32::MAX)) as u32;
        Self {
            page,
            limit,
            total,
            page_count,
            has_next: page < page_count,
            has_prev: page > 1,
        }
    }

    /// 跳页时的合法页码区间 `1..=max(page_count, 1)`
    pub fn clamp_page(&self, page: u32) -> u32 {
        page.clamp(1, self.page_count.max(1))
    }
}

/// 发给服务端的列表参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    #[serde(flatten)]
    pub filters: BTreeMap<String, String>,
}

impl ListParams {
    pub fn new(filters: &FilterState, page: u32, limit: u32) -> Self {
        let search = filters.search.trim();
        Self {
            page: page.max(1),
            limit: limit.max(1),
            search: (!search.is_empty()).then(|| search.to_string()),
            sort_by: filters.sort_by.clone(),
            sort_order: filters.sort_order,
            filters: filters
                .filters
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// 转成 query string 键值对（服务实现方拼 URL 用）
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy".to_string(), sort_by.clone()));
            pairs.push(("sortOrder".to_string(), self.sort_order.as_str().to_string()));
        }
        for (key, value) in &self.filters {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}
