// Deep Digest 核心库
// 文档提取 → 章节切分 → 缓存 → 模型摘要

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod parser;
pub mod session;
pub mod summarizer;

pub use cache::{Fingerprint, SummaryCache};
pub use config::Config;
pub use error::{ConfigError, Error, ExtractError, LlmError, Result};
pub use llm::{ChatMessage, ChatRole, LlmCapability, ProviderChain, RetryPolicy, RetryingLlm};
pub use parser::{extract, ChapterRaw, DocumentFormat, ExtractedDocument, ParserRouter};
pub use session::{UploadRecord, UploadStore};
pub use summarizer::{BookSummary, ChapterSummary, Style, Summarizer};
