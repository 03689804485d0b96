//! 远端集合服务接口
//!
//! HTTP 调用、鉴权、URL 拼接都由平台层实现，这里只约定每个资源需要的调用。
//! 返回值是原始 JSON：信封外壳由引擎统一归一化（见 `envelope`）。

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DealerSDKError, Result};
use crate::query::ListParams;

/// 单个资源（makes / models / vehicles ……）的远端服务
///
/// 实现方需要把网络错误映射为 `DealerSDKError::Transport`，
/// 非 2xx 映射为 `DealerSDKError::Http`（可用 `DealerSDKError::from_status`）。
#[async_trait]
pub trait RemoteCollectionService: Send + Sync {
    /// 分页列表
    async fn list(&self, params: &ListParams) -> Result<Value>;

    /// 创建；服务端分配 `id`、`createdAt`
    async fn create(&self, payload: Value) -> Result<Value>;

    /// 局部更新；服务端分配 `updatedAt`
    async fn update(&self, id: &str, payload: Value) -> Result<Value>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// 启用/停用等布尔开关。默认不支持，由有开关的资源覆盖
    async fn update_status(&self, id: &str, field: &str, value: bool) -> Result<Value> {
        let _ = (id, value);
        Err(DealerSDKError::InvalidOperation(format!(
            "status field `{}` is not supported by this resource",
            field
        )))
    }

    /// 聚合统计
    async fn get_stats(&self) -> Result<Value>;
}
