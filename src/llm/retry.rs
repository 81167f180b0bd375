use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use super::{ChatMessage, LlmCapability};
use crate::config::Config;
use crate::error::LlmError;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最多尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次重试前的等待时间，之后每次翻倍
    pub base_delay: Duration,
    /// 单次尝试的超时
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            timeout: config.request_timeout(),
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败后（从 0 开始）的等待时间：base * 2^attempt 加少量抖动
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_cap = (self.base_delay.as_millis() / 4) as u64;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        backoff + Duration::from_millis(jitter)
    }

    /// 按策略执行一个操作
    ///
    /// 只有临时错误和超时会重试；配额错误等其余错误原样返回。
    /// 重试耗尽后返回 [`LlmError::Failed`]
    pub async fn run<F, Fut>(&self, mut operation: F) -> Result<String, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<String, LlmError>> + Send,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let error = match tokio::time::timeout(self.timeout, operation()).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if !e.is_retryable() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(self.timeout.as_secs()),
            };

            if attempt + 1 < attempts {
                let delay = self.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "模型调用失败，稍后重试"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        Err(LlmError::Failed {
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// 给任意提供者加上超时和重试
pub struct RetryingLlm {
    inner: Arc<dyn LlmCapability>,
    policy: RetryPolicy,
}

impl RetryingLlm {
    pub fn new(inner: Arc<dyn LlmCapability>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl LlmCapability for RetryingLlm {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.policy.run(move || self.inner.generate(prompt)).await
    }

    async fn converse(&self, history: &[ChatMessage]) -> Result<String, LlmError> {
        self.policy.run(move || self.inner.converse(history)).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeLlm;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let first = policy.delay_for(0);
        let third = policy.delay_for(2);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(425));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let failures = Arc::new(AtomicUsize::new(2));
        let remaining = Arc::clone(&failures);
        let fake = Arc::new(FakeLlm::new(move |_| {
            if remaining.load(Ordering::SeqCst) > 0 {
                remaining.fetch_sub(1, Ordering::SeqCst);
                Err(LlmError::TransientFailure("503".to_string()))
            } else {
                Ok("done".to_string())
            }
        }));

        let llm = RetryingLlm::new(fake.clone(), fast_policy(3));
        assert_eq!(llm.generate("p").await.unwrap(), "done");
        assert_eq!(fake.generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_quota_is_not_retried() {
        let fake = Arc::new(FakeLlm::new(|_| {
            Err(LlmError::QuotaExceeded("429".to_string()))
        }));

        let llm = RetryingLlm::new(fake.clone(), fast_policy(3));
        let err = llm.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::QuotaExceeded(_)));
        assert_eq!(fake.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_failed() {
        let fake = Arc::new(FakeLlm::new(|_| {
            Err(LlmError::TransientFailure("boom".to_string()))
        }));

        let llm = RetryingLlm::new(fake.clone(), fast_policy(2));
        let err = llm.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::Failed { attempts: 2, ref message } if message.contains("boom")));
        assert_eq!(fake.generate_calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_retryable() {
        let fake = Arc::new(
            FakeLlm::fixed("late").with_delay(|_| Duration::from_millis(200)),
        );
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };

        let llm = RetryingLlm::new(fake.clone(), policy);
        let err = llm.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::Failed { attempts: 2, .. }));
        assert_eq!(fake.generate_calls(), 2);
    }

    #[tokio::test]
    async fn test_converse_goes_through_policy() {
        let fake = Arc::new(FakeLlm::fixed("reply"));
        let llm = RetryingLlm::new(fake.clone(), fast_policy(1));

        let reply = llm.converse(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "reply");
        assert_eq!(fake.converse_calls(), 1);
    }
}
