//! 聚合统计视图（服务端计算，和分页窗口无关）

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 统计卡片数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    /// 其它计数（byStatus、pending、thisMonth……），嵌套对象按 `a.b` 展平
    pub extra: BTreeMap<String, u64>,
    /// 本地收到该统计的时间
    pub fetched_at: Option<DateTime<Utc>>,
}

impl StatsView {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut stats = StatsView::default();
        for (key, value) in object {
            match key.as_str() {
                "total" => stats.total = as_count(value).unwrap_or(0),
                "active" => stats.active = as_count(value).unwrap_or(0),
                "inactive" => stats.inactive = as_count(value).unwrap_or(0),
                _ => collect_counts(key, value, &mut stats.extra),
            }
        }
        stats
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        match key {
            "total" => Some(self.total),
            "active" => Some(self.active),
            "inactive" => Some(self.inactive),
            _ => self.extra.get(key).copied(),
        }
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn collect_counts(prefix: &str, value: &Value, out: &mut BTreeMap<String, u64>) {
    match value {
        Value::Object(inner) => {
            for (key, nested) in inner {
                collect_counts(&format!("{}.{}", prefix, key), nested, out);
            }
        }
        other => {
            if let Some(count) = as_count(other) {
                out.insert(prefix.to_string(), count);
            }
        }
    }
}
