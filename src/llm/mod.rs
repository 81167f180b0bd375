use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LlmError;

pub mod gemini;
pub mod prompts;
pub mod retry;
pub mod structured;

pub use retry::{RetryPolicy, RetryingLlm};
pub use structured::{parse_structured, try_parse_structured};

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            content: content.into(),
        }
    }
}

/// 文本生成能力
///
/// 摘要编排只依赖这个 trait，具体的模型服务（Gemini HTTP 接口、测试替身）
/// 都在它后面
#[async_trait]
pub trait LlmCapability: Send + Sync {
    /// 提供者名称（通常是模型名）
    fn name(&self) -> &str;

    /// 单轮生成
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// 多轮对话：传入完整历史（最后一条是用户的新问题），返回模型回复
    async fn converse(&self, history: &[ChatMessage]) -> Result<String, LlmError>;

    /// 启动时探测是否可用
    async fn health_check(&self) -> bool {
        true
    }
}

/// 按优先级排列的提供者链
///
/// 启动时依次探测，选中第一个可用的；全部不可用时退回最后一个
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn LlmCapability>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: Arc<dyn LlmCapability>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 选出要使用的提供者，链为空时返回 None
    pub async fn resolve(&self) -> Option<Arc<dyn LlmCapability>> {
        for provider in &self.providers {
            if provider.health_check().await {
                info!(provider = provider.name(), "使用模型");
                return Some(Arc::clone(provider));
            }
            warn!(provider = provider.name(), "模型不可用，尝试下一个");
        }

        let fallback = self.providers.last().cloned();
        if let Some(ref provider) = fallback {
            warn!(provider = provider.name(), "没有可用模型，退回最后一个");
        }
        fallback
    }
}

impl FromIterator<Arc<dyn LlmCapability>> for ProviderChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn LlmCapability>>>(iter: I) -> Self {
        Self {
            providers: iter.into_iter().collect(),
        }
    }
}

/// 测试替身
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;
    type DelayFn = Box<dyn Fn(&str) -> Duration + Send + Sync>;

    /// 可编程的假模型，记录调用次数和收到的提示词
    pub struct FakeLlm {
        name: String,
        responder: Responder,
        delay: Option<DelayFn>,
        healthy: bool,
        generate_calls: AtomicUsize,
        converse_calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        histories: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeLlm {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
        {
            Self {
                name: "fake".to_string(),
                responder: Box::new(responder),
                delay: None,
                healthy: true,
                generate_calls: AtomicUsize::new(0),
                converse_calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                histories: Mutex::new(Vec::new()),
            }
        }

        /// 每次都返回同一段文本
        pub fn fixed(reply: &str) -> Self {
            let reply = reply.to_string();
            Self::new(move |_| Ok(reply.clone()))
        }

        pub fn named(mut self, name: &str) -> Self {
            self.name = name.to_string();
            self
        }

        pub fn unhealthy(mut self) -> Self {
            self.healthy = false;
            self
        }

        /// 按提示词决定响应延迟
        pub fn with_delay<F>(mut self, delay: F) -> Self
        where
            F: Fn(&str) -> Duration + Send + Sync + 'static,
        {
            self.delay = Some(Box::new(delay));
            self
        }

        pub fn generate_calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }

        pub fn converse_calls(&self) -> usize {
            self.converse_calls.load(Ordering::SeqCst)
        }

        pub fn total_calls(&self) -> usize {
            self.generate_calls() + self.converse_calls()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
            self.histories.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmCapability for FakeLlm {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(ref delay) = self.delay {
                tokio::time::sleep(delay(prompt)).await;
            }
            (self.responder)(prompt)
        }

        async fn converse(&self, history: &[ChatMessage]) -> Result<String, LlmError> {
            self.converse_calls.fetch_add(1, Ordering::SeqCst);
            self.histories.lock().unwrap().push(history.to_vec());
            let last = history.last().map(|m| m.content.as_str()).unwrap_or_default();
            (self.responder)(last)
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }
}
