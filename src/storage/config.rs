//! 配置文件管理模块

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库文件路径（为空则使用平台数据目录）
    pub db_path: Option<PathBuf>,
    /// 默认行数上限
    pub default_row_cap: usize,
    /// 查询超时（毫秒）
    pub query_timeout_ms: u64,
    /// 临时性失败重试退避（毫秒）
    pub retry_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_row_cap: 20,
            query_timeout_ms: 5000,
            retry_backoff_ms: 200,
        }
    }
}

impl AppConfig {
    /// 转为执行选项
    pub fn exec_options(&self) -> crate::core::executor::ExecOptions {
        crate::core::executor::ExecOptions {
            row_cap: self.default_row_cap,
            timeout: std::time::Duration::from_millis(self.query_timeout_ms),
            retry_backoff: std::time::Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 获取默认配置路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "wenshu", "Wenshu")
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    /// 获取默认数据库路径
    pub fn default_db_path() -> PathBuf {
        directories::ProjectDirs::from("com", "wenshu", "Wenshu")
            .map(|d| d.data_dir().join("wenshu.db"))
            .unwrap_or_else(|| PathBuf::from("wenshu.db"))
    }

    /// 加载配置
    pub fn load(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// 重置为默认配置
    pub fn reset(&self) -> Result<()> {
        self.save(&AppConfig::default())
    }
}
