use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatMessage, ChatRole, LlmCapability, ProviderChain};
use crate::config::Config;
use crate::error::LlmError;

/// 错误信息中保留的响应体长度
const ERROR_BODY_CHARS: usize = 200;

/// Gemini `generateContent` REST 接口
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    client: Client,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::TransientFailure(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }

    pub fn from_config(config: &Config, model: &str) -> Result<Self, LlmError> {
        Self::new(
            config.gemini_api_key.clone(),
            model,
            config.gemini_base_url.clone(),
            config.request_timeout(),
        )
    }

    /// 按配置中的模型优先级构建提供者链
    pub fn chain_from_config(config: &Config) -> Result<ProviderChain, LlmError> {
        let mut chain = ProviderChain::new();
        for model in &config.model_priority {
            chain.push(Arc::new(Self::from_config(config, model)?));
        }
        Ok(chain)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    fn build_contents(history: &[ChatMessage]) -> Vec<Value> {
        history
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                };
                json!({
                    "role": role,
                    "parts": [{ "text": msg.content }]
                })
            })
            .collect()
    }

    async fn send(&self, contents: Vec<Value>) -> Result<String, LlmError> {
        let url = format!("{}:generateContent", self.model_url());
        let body = json!({ "contents": contents });

        debug!(model = %self.model, "调用 generateContent");
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let json: Value = resp.json().await.map_err(|e| self.transport_error(e))?;
        extract_text(&json)
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if e.is_decode() {
            LlmError::MalformedModelOutput(e.to_string())
        } else {
            LlmError::TransientFailure(e.to_string())
        }
    }
}

/// 根据 HTTP 状态码和响应体对错误分类
fn classify_status(status: u16, body: &str) -> LlmError {
    let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
    let lower = body.to_lowercase();

    if status == 429 || body.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
        LlmError::QuotaExceeded(snippet)
    } else if status == 408 || status >= 500 {
        LlmError::TransientFailure(format!("HTTP {}: {}", status, snippet))
    } else {
        LlmError::Api {
            status,
            message: snippet,
        }
    }
}

/// 拼接第一个候选的所有文本片段
fn extract_text(json: &Value) -> Result<String, LlmError> {
    let parts = json["candidates"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .ok_or_else(|| LlmError::MalformedModelOutput("响应中缺少 candidates 内容".to_string()))?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(LlmError::MalformedModelOutput("响应中没有文本".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LlmCapability for GeminiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.send(Self::build_contents(&[ChatMessage::user(prompt)]))
            .await
    }

    async fn converse(&self, history: &[ChatMessage]) -> Result<String, LlmError> {
        self.send(Self::build_contents(history)).await
    }

    /// 查询模型元数据，能查到即视为可用
    async fn health_check(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }

        match self
            .client
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new("AIza-test", "gemini-test", server.uri(), Duration::from_secs(5))
            .unwrap()
    }

    fn reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] }
            }]
        })
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, "slow down"), LlmError::QuotaExceeded(_)));
        assert!(matches!(
            classify_status(400, "{\"status\": \"RESOURCE_EXHAUSTED\"}"),
            LlmError::QuotaExceeded(_)
        ));
        assert!(matches!(classify_status(503, "unavailable"), LlmError::TransientFailure(_)));
        assert!(matches!(
            classify_status(404, "no such model"),
            LlmError::Api { status: 404, .. }
        ));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(extract_text(&json).unwrap(), "ab");
        assert!(extract_text(&json!({ "candidates": [] })).is_err());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "AIza-test"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).generate("hello").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn test_converse_sends_history_roles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(body_partial_json(json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "seed" }] },
                    { "role": "model", "parts": [{ "text": "ok" }] },
                    { "role": "user", "parts": [{ "text": "question?" }] }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("answer")))
            .mount(&server)
            .await;

        let history = vec![
            ChatMessage::user("seed"),
            ChatMessage::model("ok"),
            ChatMessage::user("question?"),
        ];
        assert_eq!(provider(&server).converse(&history).await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_quota_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
            .mount(&server)
            .await;

        let err = provider(&server).generate("x").await.unwrap_err();
        assert!(matches!(err, LlmError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server).generate("x").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/gemini-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "models/gemini-test" })))
            .mount(&server)
            .await;

        assert!(provider(&server).health_check().await);

        let missing = GeminiProvider::new("AIza-test", "gone", server.uri(), Duration::from_secs(5))
            .unwrap();
        assert!(!missing.health_check().await);

        let no_key = GeminiProvider::new("", "gemini-test", server.uri(), Duration::from_secs(5))
            .unwrap();
        assert!(!no_key.health_check().await);
    }

    #[test]
    fn test_chain_from_config() {
        let config = Config::default();
        let chain = GeminiProvider::chain_from_config(&config).unwrap();
        assert_eq!(chain.len(), config.model_priority.len());
    }
}
