//! 预订核心配置
//!
//! 配置来源优先级：
//! 1. 显式传入的路径
//! 2. 环境变量 `PAWLINK_CONFIG` 指定的路径
//! 3. 默认候选路径 `config/booking-core.toml`
//!
//! 所有字段都有默认值，任何来源加载失败都会回退到默认配置。

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 协调器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// 列表缓存新鲜窗口（毫秒），窗口内的重复 load 直接使用缓存
    pub freshness_window_ms: u64,
    /// 乐观状态更新的回滚超时（毫秒）
    pub rollback_timeout_ms: u64,
    /// 自动刷新间隔（毫秒）
    pub auto_refresh_interval_ms: u64,
    /// 列表分页大小
    pub page_size: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: 30_000,    // 30秒内的列表视为新鲜
            rollback_timeout_ms: 5_000,     // 5秒未确认即回滚
            auto_refresh_interval_ms: 30_000, // 30秒静默刷新一次
            page_size: 10,
        }
    }
}

impl ReconcilerConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_millis(self.rollback_timeout_ms)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.auto_refresh_interval_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 环境变量优先于该配置）
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 预订核心应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingCoreConfig {
    pub reconciler: ReconcilerConfig,
    pub logging: LoggingConfig,
}

/// 加载配置
///
/// 任何候选路径都加载失败时回退到默认配置，不会中断启动。
pub fn load_config(path: Option<&str>) -> BookingCoreConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => match env::var("PAWLINK_CONFIG") {
            Ok(p) => vec![PathBuf::from(p)],
            Err(_) => vec![PathBuf::from("config/booking-core.toml")],
        },
    };

    for candidate in &candidates {
        match load_config_from_source(candidate) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", candidate.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    BookingCoreConfig::default()
}

/// 从单个文件加载配置
fn load_config_from_source(path: &Path) -> Result<BookingCoreConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
    let config: BookingCoreConfig = toml::from_str(&content)
        .with_context(|| format!("无效的配置格式: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.freshness_window(), Duration::from_secs(30));
        assert_eq!(config.rollback_timeout(), Duration::from_secs(5));
        assert_eq!(config.auto_refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let raw = r#"
            [reconciler]
            rollback_timeout_ms = 1500

            [logging]
            level = "info"
        "#;
        let config: BookingCoreConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.reconciler.rollback_timeout_ms, 1500);
        assert_eq!(config.reconciler.page_size, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.with_target);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some("does/not/exist.toml"));
        assert_eq!(config.reconciler.page_size, 10);
    }
}
