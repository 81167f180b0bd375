use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::LlmError;

/// 错误信息中保留的原文长度
const SNIPPET_CHARS: usize = 200;

/// 去掉模型常见的 Markdown 代码块包裹
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// 在一段夹杂说明文字的输出中找出最外层的 JSON 对象或数组
fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// 解析模型返回的结构化 JSON，失败时返回 [`LlmError::MalformedModelOutput`]
pub fn try_parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let text = strip_code_fences(raw);

    let first_error = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(candidate) = outermost_json(text) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
    Err(LlmError::MalformedModelOutput(format!(
        "{}; 原始输出: {}",
        first_error, snippet
    )))
}

/// 解析失败时返回给定的默认值
pub fn parse_structured<T: DeserializeOwned>(raw: &str, default: T) -> T {
    match try_parse_structured(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "模型输出无法解析，使用默认值");
            default
        }
    }
}
