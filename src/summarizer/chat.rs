use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::llm::prompts::{chat_seed, CHAT_ACKNOWLEDGEMENT};
use crate::llm::ChatMessage;

/// 一次围绕某本书的多轮对话
#[derive(Debug, Clone)]
pub struct Conversation {
    pub book_id: String,
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// 以书籍内容开场：用户消息携带上下文，模型给出固定确认
    fn seeded(book_id: &str, context: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            history: vec![
                ChatMessage::user(chat_seed(context)),
                ChatMessage::model(CHAT_ACKNOWLEDGEMENT),
            ],
            created_at: Utc::now(),
        }
    }
}

/// 对话会话表
///
/// 不同会话互不影响；同一会话的消息通过会话自身的锁串行处理
#[derive(Default)]
pub struct ChatSessions {
    sessions: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
}

impl ChatSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建会话，返回会话 ID（`{book_id}_{uuid}`）
    pub async fn start(&self, book_id: &str, context: &str) -> String {
        let session_id = format!("{}_{}", book_id, Uuid::new_v4());
        let conversation = Conversation::seeded(book_id, context);

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(conversation)));

        info!(session_id = %session_id, "创建对话会话");
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 结束会话，会话不存在时返回 false
    pub async fn end(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "结束对话会话");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
