//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件
//!
//! The search core never reads this module: values are converted into
//! settings structs and injected at construction.

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::search::{CoordinatorSettings, ExecutorSettings, QueryParser, RetryPolicy};

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Environment variable overriding the API key / 覆盖API密钥的环境变量
pub const API_KEY_ENV: &str = "BAZAAR_API_KEY";

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External API configuration / 外部API配置
    #[serde(default)]
    pub api: ApiConfig,
    /// Search configuration / 搜索配置
    #[serde(default)]
    pub search: SearchConfig,
    /// Download configuration / 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
}

/// External API configuration / 外部API配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Endpoint URL / 接口地址
    pub endpoint: String,
    /// Static API credential sent as `API-KEY` / 静态API凭证
    pub api_key: String,
    /// Per-attempt timeout in seconds / 单次请求超时(秒)
    pub timeout_secs: u64,
    /// Attempts per sub-request when timing out / 超时重试次数
    pub retry_attempts: u32,
}

/// Search configuration / 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Start offset between sub-requests in milliseconds / 子请求启动间隔(毫秒)
    pub stagger_interval_ms: u64,
    /// Limit used when the query has none / 默认结果数量
    pub default_limit: u32,
    /// API maximum for `limit` / API允许的最大limit
    pub max_limit: u32,
}

/// Download configuration / 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory samples are written to / 样本保存目录
    pub dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mb-api.abuse.ch/api/v1/".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            stagger_interval_ms: 500,
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: "malware".to_string(),
        }
    }
}

impl AppConfig {
    /// Per-attempt timeout / 单次请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    /// API key, environment variable first / 获取API密钥(环境变量优先)
    pub fn api_key(&self) -> String {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| self.api.api_key.clone())
    }

    /// Executor settings derived from this config / 生成执行器设置
    pub fn executor_settings(&self) -> ExecutorSettings {
        let timeout = self.request_timeout();
        ExecutorSettings {
            timeout,
            retry: RetryPolicy::on_timeout(self.api.retry_attempts, timeout),
        }
    }

    /// Coordinator settings derived from this config / 生成协调器设置
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            stagger_interval: Duration::from_millis(self.search.stagger_interval_ms),
            ..CoordinatorSettings::default()
        }
    }

    /// Query parser using the configured limits / 使用配置限制的查询解析器
    pub fn query_parser(&self) -> QueryParser {
        QueryParser::new(self.search.default_limit, self.search.max_limit)
    }

    /// Get the download directory / 获取下载目录
    pub fn get_download_dir(&self) -> PathBuf {
        PathBuf::from(&self.download.dir)
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from a specific file / 从指定文件加载配置
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    let content = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    let config_path = get_config_path();

    if config_path.exists() {
        // Load existing config / 加载现有配置
        let config = load_config_from(&config_path)?;
        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(&config, &config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to a specific file / 保存配置到指定文件
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config() -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config()?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG.set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG.get_or_init(|| {
        let config = load_config().unwrap_or_default();
        Arc::new(RwLock::new(config))
    }).clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}
