use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ExtractError;

// 子模块声明
pub mod chapter_detector;
pub mod docx_parser;
pub mod epub_parser;
pub mod pdf_parser;
pub mod txt_parser;

use chapter_detector::ChapterDetector;

/// 平均阅读速度（词/分钟）
pub const WORDS_PER_MINUTE: f64 = 200.0;

/// 支持的文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Docx,
    Txt,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Pdf,
        DocumentFormat::Epub,
        DocumentFormat::Docx,
        DocumentFormat::Txt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Epub => "epub",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Txt => "txt",
        }
    }

    /// 从文件路径的扩展名推断格式
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExtractError::UnsupportedFormat("无法识别文件扩展名".to_string()))?;
        ext.parse()
    }
}

impl FromStr for DocumentFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "epub" => Ok(DocumentFormat::Epub),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" => Ok(DocumentFormat::Txt),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 章节原始数据
///
/// 顺序即文档顺序，内容不应为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRaw {
    /// 章节标题
    pub title: String,
    /// 章节正文
    pub content: String,
    /// 正文词数
    pub word_count: usize,
}

impl ChapterRaw {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let word_count = count_words(&content);
        Self {
            title: title.into(),
            content,
            word_count,
        }
    }
}

/// 单个解析器的输出
///
/// 由 [`ParserRouter::extract`] 统一补齐词数、阅读时间和章节
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    pub title: String,
    pub author: String,
    pub page_count: usize,
    pub full_text: String,
    /// 解析器自带的章节结构（目前只有 EPUB 提供），为空时交给章节检测器
    pub chapters: Vec<ChapterRaw>,
}

/// 提取后的文档
///
/// 每次上传生成一次，之后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub filename: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    pub title: String,
    pub author: String,
    pub page_count: usize,
    pub word_count: usize,
    /// 预计阅读时间（分钟，不取整）
    pub estimated_reading_time: f64,
    pub full_text: String,
    pub chapters: Vec<ChapterRaw>,
}

/// Parser trait
///
/// 所有格式解析器必须实现此 trait
pub trait Parser: Send + Sync {
    /// 解析文件，返回纯文本和元数据
    fn parse(&self, file_path: &Path) -> Result<ParsedContent, ExtractError>;

    /// 解析器负责的格式
    fn format(&self) -> DocumentFormat;
}

/// Parser 路由器
///
/// 根据声明的格式路由到对应的解析器，并完成通用的后处理
pub struct ParserRouter {
    parsers: HashMap<DocumentFormat, Box<dyn Parser>>,
    detector: ChapterDetector,
}

impl ParserRouter {
    /// 创建新的路由器实例，注册所有内置解析器
    pub fn new() -> Self {
        let mut router = Self {
            parsers: HashMap::new(),
            detector: ChapterDetector::new(),
        };

        router.register(Box::new(pdf_parser::PdfParser::new()));
        router.register(Box::new(epub_parser::EpubParser::new()));
        router.register(Box::new(docx_parser::DocxParser::new()));
        router.register(Box::new(txt_parser::TxtParser::new()));

        router
    }

    /// 注册（或替换）某个格式的解析器
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        self.parsers.insert(parser.format(), parser);
    }

    /// 根据格式取得解析器
    pub fn route(&self, format: DocumentFormat) -> Result<&dyn Parser, ExtractError> {
        self.parsers
            .get(&format)
            .map(|p| p.as_ref())
            .ok_or_else(|| ExtractError::UnsupportedFormat(format.to_string()))
    }

    /// 检查是否支持指定的文件扩展名
    pub fn supports(&self, extension: &str) -> bool {
        extension
            .parse::<DocumentFormat>()
            .map(|f| self.parsers.contains_key(&f))
            .unwrap_or(false)
    }

    /// 按声明的格式提取文档
    ///
    /// `declared_format` 为小写扩展名（pdf / epub / docx / txt）
    pub fn extract(
        &self,
        file_path: &Path,
        declared_format: &str,
    ) -> Result<ExtractedDocument, ExtractError> {
        let format: DocumentFormat = declared_format.parse()?;
        let parser = self.route(format)?;
        let size_bytes = fs::metadata(file_path)?.len();

        debug!(path = %file_path.display(), %format, size_bytes, "开始提取文本");
        let parsed = parser.parse(file_path)?;

        if parsed.full_text.trim().is_empty() {
            return Err(ExtractError::failure(format.as_str(), "未能提取到任何文本内容"));
        }

        let word_count = count_words(&parsed.full_text);
        let chapters = if parsed.chapters.is_empty() {
            self.detector.detect(&parsed.full_text)
        } else {
            parsed.chapters
        };

        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(
            file = %filename,
            %format,
            word_count,
            chapters = chapters.len(),
            "文本提取完成"
        );

        Ok(ExtractedDocument {
            filename,
            format,
            size_bytes,
            title: parsed.title,
            author: parsed.author,
            page_count: parsed.page_count,
            word_count,
            estimated_reading_time: word_count as f64 / WORDS_PER_MINUTE,
            full_text: parsed.full_text,
            chapters,
        })
    }

    /// 按文件扩展名提取文档
    pub fn extract_path(&self, file_path: &Path) -> Result<ExtractedDocument, ExtractError> {
        let format = DocumentFormat::from_path(file_path)?;
        self.extract(file_path, format.as_str())
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用默认路由器提取文档
pub fn extract(file_path: &Path, declared_format: &str) -> Result<ExtractedDocument, ExtractError> {
    ParserRouter::new().extract(file_path, declared_format)
}

/// 以空白分隔的词数
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
