//! SDK 版本与构建元信息
//!
//! - **SDK Version** → Cargo.toml（唯一权威源）
//! - **Build Metadata** → build.rs 中的 vergen

/// SDK semver，来自 Cargo.toml
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// git commit（由 vergen 在 build.rs 中生成，取不到时为 "unknown"）
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// build time（由 vergen 在 build.rs 中生成）
pub const BUILD_TIME: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

/// 拼接成日志/诊断用的一行版本串
pub fn version_string() -> String {
    format!("dealer-sdk {} ({}, built {})", SDK_VERSION, GIT_SHA, BUILD_TIME)
}
