use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::parser::ExtractedDocument;
use crate::summarizer::BookSummary;

/// 一次上传
///
/// 文档提取后不再修改；摘要每次重新生成后整体替换
#[derive(Clone, Debug)]
pub struct UploadRecord {
    /// 上传 ID
    pub upload_id: String,
    /// 提取结果
    pub document: Arc<ExtractedDocument>,
    /// 上传文件的保存路径
    pub file_path: PathBuf,
    /// 上传时间
    pub uploaded_at: DateTime<Utc>,
    /// 最近一次生成的全书摘要
    pub summary: Option<Arc<BookSummary>>,
}

/// 上传记录表
///
/// 进程内保存，进程退出即清空
#[derive(Clone, Default)]
pub struct UploadStore {
    uploads: Arc<Mutex<HashMap<String, UploadRecord>>>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, UploadRecord>>> {
        self.uploads
            .lock()
            .map_err(|e| Error::Other(format!("锁定上传表失败: {}", e)))
    }

    /// 保存一次上传
    ///
    /// # 参数
    /// - `document`: 提取后的文档
    /// - `file_path`: 上传文件路径
    ///
    /// # 返回
    /// 新生成的上传 ID
    pub fn insert(&self, document: ExtractedDocument, file_path: PathBuf) -> Result<String> {
        let upload_id = Uuid::new_v4().to_string();
        let record = UploadRecord {
            upload_id: upload_id.clone(),
            document: Arc::new(document),
            file_path,
            uploaded_at: Utc::now(),
            summary: None,
        };

        self.lock()?.insert(upload_id.clone(), record);
        debug!(upload_id = %upload_id, "保存上传记录");
        Ok(upload_id)
    }

    pub fn get(&self, upload_id: &str) -> Result<Option<UploadRecord>> {
        Ok(self.lock()?.get(upload_id).cloned())
    }

    /// 记录最新的全书摘要
    ///
    /// # 返回
    /// 上传 ID 不存在时返回 false
    pub fn set_summary(&self, upload_id: &str, summary: BookSummary) -> Result<bool> {
        let mut uploads = self.lock()?;
        match uploads.get_mut(upload_id) {
            Some(record) => {
                record.summary = Some(Arc::new(summary));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, upload_id: &str) -> Result<Option<UploadRecord>> {
        Ok(self.lock()?.remove(upload_id))
    }

    /// 按上传时间排序的所有上传 ID
    pub fn list(&self) -> Result<Vec<String>> {
        let uploads = self.lock()?;
        let mut records: Vec<&UploadRecord> = uploads.values().collect();
        records.sort_by_key(|r| r.uploaded_at);
        Ok(records.into_iter().map(|r| r.upload_id.clone()).collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
