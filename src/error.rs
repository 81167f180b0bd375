use thiserror::Error;

/// 文本提取错误
#[derive(Error, Debug)]
pub enum ExtractError {
    /// 声明的格式不在 pdf / epub / docx / txt 之内
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    /// 底层读取器无法产出文本（文件损坏、编码不支持等）
    #[error("{format} 解析失败: {cause}")]
    ExtractionFailure { format: String, cause: String },
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn failure(format: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ExtractError::ExtractionFailure {
            format: format.into(),
            cause: cause.to_string(),
        }
    }
}

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 配额耗尽，不重试，需要用户处理
    #[error(
        "API 配额已用尽！当前 API Key 的免费额度已经用完。\n\n\
         解决办法：\n\
         1. 在 https://aistudio.google.com/app/apikey 申请新的 API Key\n\
         2. 等待 24 小时配额重置\n\
         3. 升级到付费套餐：https://ai.google.dev/pricing\n\n\
         原始错误: {0}"
    )]
    QuotaExceeded(String),
    /// 可重试的临时错误（网络、5xx 等）
    #[error("临时错误: {0}")]
    TransientFailure(String),
    #[error("请求超时（{0} 秒）")]
    Timeout(u64),
    /// 重试耗尽后的通用失败
    #[error("重试 {attempts} 次后仍然失败: {message}")]
    Failed { attempts: u32, message: String },
    /// 模型没有返回期望的 JSON 结构
    #[error("模型输出格式错误: {0}")]
    MalformedModelOutput(String),
    #[error("会话不存在: {0}，请重新开始对话")]
    SessionNotFound(String),
    #[error("API 错误 ({status}): {message}")]
    Api { status: u16, message: String },
}

impl LlmError {
    /// 是否允许重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::TransientFailure(_) | LlmError::Timeout(_))
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件解析失败 {path}: {message}")]
    Parse { path: String, message: String },
    #[error("配置项 {key} 的值无效: {value}")]
    InvalidValue { key: String, value: String },
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 顶层错误
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
