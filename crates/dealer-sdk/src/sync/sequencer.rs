use std::sync::atomic::{AtomicU64, Ordering};

/// 请求序号：每次发请求取一个新号，只有最新号的响应会被应用
///
/// 列表请求不做取消；被新请求取代的旧响应回来时直接丢弃。
#[derive(Debug, Default)]
pub struct FetchSequencer {
    latest: AtomicU64,
}

impl FetchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出新请求
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 该响应是否仍是最新请求的结果
    pub fn is_current(&self, tag: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == tag
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
