use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "deep-digest.toml";

/// 应用配置
///
/// 先读取 TOML 文件（不存在时使用默认值），再用环境变量覆盖
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gemini API Key
    pub gemini_api_key: String,
    /// Gemini REST 接口地址
    pub gemini_base_url: String,
    /// 按优先级排列的模型名（不同模型配额独立）
    pub model_priority: Vec<String>,
    /// 单次请求最多发送的字符数
    pub max_chars_per_request: usize,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 临时错误的最大尝试次数
    pub max_retries: u32,
    /// 缓存目录
    pub cache_dir: PathBuf,
    pub enable_cache: bool,
    /// 上传文件大小上限（MB）
    pub max_file_size_mb: u64,
    /// 章节摘要的并发上限
    pub max_concurrent_chapters: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model_priority: vec![
                "gemini-2.0-flash-lite".to_string(),
                "gemini-flash-latest".to_string(),
                "learnlm-2.0-flash-experimental".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemma-3-12b-it".to_string(),
            ],
            max_chars_per_request: 30000,
            request_timeout_secs: 60,
            max_retries: 3,
            cache_dir: PathBuf::from("cache"),
            enable_cache: true,
            max_file_size_mb: 50,
            max_concurrent_chapters: 1,
        }
    }
}

impl Config {
    /// 加载配置：文件（可选）+ 进程环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 从 TOML 文件读取，文件不存在时返回默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "配置文件不存在，使用默认配置");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), "已加载配置文件");
        Ok(config)
    }

    /// 用环境变量覆盖配置项
    ///
    /// `lookup` 通常是 `std::env::var`，测试中可以传入固定表
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.gemini_api_key = v;
        }
        if let Some(v) = lookup("GEMINI_BASE_URL") {
            self.gemini_base_url = v;
        }
        if let Some(v) = lookup("GEMINI_MODELS") {
            let models: Vec<String> = v
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if models.is_empty() {
                return Err(invalid("GEMINI_MODELS", &v));
            }
            self.model_priority = models;
        }
        if let Some(v) = lookup("MAX_TOKENS_PER_REQUEST") {
            self.max_chars_per_request = parse_number("MAX_TOKENS_PER_REQUEST", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENABLE_CACHE") {
            self.enable_cache = parse_flag(&v);
        }
        if let Some(v) = lookup("MAX_FILE_SIZE_MB") {
            self.max_file_size_mb = parse_number("MAX_FILE_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_CHAPTERS") {
            let n: usize = parse_number("MAX_CONCURRENT_CHAPTERS", &v)?;
            if n == 0 {
                return Err(invalid("MAX_CONCURRENT_CHAPTERS", &v));
            }
            self.max_concurrent_chapters = n;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "True" | "true" | "TRUE" | "1" | "yes")
}
