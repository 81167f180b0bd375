use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::summarizer::Style;

/// 缓存键：内容指纹
///
/// 相同输入总是得到相同指纹
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 章节摘要的指纹：(章节正文, 风格, 语言)
    pub fn chapter(text: &str, style: Style, language: &str) -> Self {
        Self::digest(format!("{}_{}_{}", text, style.as_str(), language).as_bytes())
    }

    /// 任意若干部分拼接后的指纹（用于全书摘要、主题分析等）
    pub fn of_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 摘要缓存
///
/// 每个指纹对应缓存目录下一个 `{fingerprint}.json` 文件。
/// 读取失败一律视为未命中，写入失败只记录日志，从不向上抛错
#[derive(Debug, Clone)]
pub struct SummaryCache {
    dir: PathBuf,
    enabled: bool,
}

impl SummaryCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    /// 关闭的缓存：get 总是未命中，put 不做任何事
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    /// 读取缓存条目，缺失或损坏时返回 None
    pub fn get<T: DeserializeOwned>(&self, fingerprint: &Fingerprint) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(fingerprint);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%fingerprint, "缓存未命中");
                return None;
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "读取缓存失败，按未命中处理");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(%fingerprint, "缓存命中");
                Some(value)
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "缓存条目已损坏，按未命中处理");
                None
            }
        }
    }

    /// 写入缓存条目
    ///
    /// 先写临时文件再原子替换，并发写同一指纹时后写者生效
    pub fn put<T: Serialize>(&self, fingerprint: &Fingerprint, value: &T) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.try_put(fingerprint, value) {
            warn!(%fingerprint, error = %e, "写入缓存失败");
        }
    }

    fn try_put<T: Serialize>(&self, fingerprint: &Fingerprint, value: &T) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_vec_pretty(value)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.entry_path(fingerprint))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// 删除所有缓存条目，返回删除数量
    pub fn clear(&self) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
