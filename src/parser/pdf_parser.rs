use super::*;
use encoding_rs::{UTF_16BE, WINDOWS_1252};
use lopdf::{Document, Object};
use std::panic;
use tracing::{debug, warn};

/// PDF 解析器
///
/// 主路径用 lopdf 逐页提取文本并读取 Info 元数据；
/// 主路径得不到文本时回退到 pdf-extract，两者都失败才报错。
/// 不支持扫描版 PDF
#[derive(Clone)]
pub struct PdfParser;

impl PdfParser {
    /// 创建新的 PDF 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 读取 Info 字典中的字段（Title / Author），缺失时返回空字符串
    fn read_info_field(&self, doc: &Document, key: &[u8]) -> String {
        let info = match doc.trailer.get(b"Info").and_then(|obj| doc.dereference(obj)) {
            Ok((_, Object::Dictionary(dict))) => dict,
            _ => return String::new(),
        };

        match info.get(key).and_then(|obj| doc.dereference(obj)) {
            Ok((_, Object::String(bytes, _))) => decode_pdf_string(bytes),
            _ => String::new(),
        }
    }

    /// 主路径：逐页提取文本，页与页之间以空行分隔
    fn extract_pages(&self, doc: &Document) -> String {
        let mut pages_text = Vec::new();

        for page_number in doc.get_pages().keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) if !text.trim().is_empty() => pages_text.push(text.trim().to_string()),
                Ok(_) => {}
                Err(e) => debug!(page = page_number, error = %e, "单页文本提取失败"),
            }
        }

        pages_text.join("\n\n")
    }

    /// 备用路径：pdf-extract 整体提取
    fn extract_fallback(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        // pdf-extract 遇到个别畸形文件会 panic
        match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ExtractError::failure(
                "pdf",
                format!("{}。可能是扫描版 PDF，暂不支持", e),
            )),
            Err(_) => Err(ExtractError::failure("pdf", "备用解析器异常退出")),
        }
    }
}

/// 解码 PDF 文本字符串：带 BOM 的 UTF-16BE，否则按单字节编码
fn decode_pdf_string(bytes: &[u8]) -> String {
    let decoded = if bytes.starts_with(&[0xFE, 0xFF]) {
        UTF_16BE.decode_without_bom_handling(&bytes[2..]).0
    } else {
        WINDOWS_1252.decode_without_bom_handling(bytes).0
    };
    decoded.trim_matches(char::from(0)).trim().to_string()
}

impl Parser for PdfParser {
    fn parse(&self, file_path: &Path) -> Result<ParsedContent, ExtractError> {
        let bytes = fs::read(file_path).map_err(|e| ExtractError::failure("pdf", e))?;

        let (title, author, page_count, primary_text) = match Document::load_mem(&bytes) {
            Ok(doc) => (
                self.read_info_field(&doc, b"Title"),
                self.read_info_field(&doc, b"Author"),
                doc.get_pages().len(),
                self.extract_pages(&doc),
            ),
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "lopdf 无法打开 PDF");
                (String::new(), String::new(), 0, String::new())
            }
        };

        let full_text = if primary_text.trim().is_empty() {
            warn!(path = %file_path.display(), "主路径未提取到文本，改用备用策略");
            self.extract_fallback(&bytes)?
        } else {
            primary_text
        };

        // 检查是否为扫描版 PDF（无文本内容）
        if full_text.trim().is_empty() {
            return Err(ExtractError::failure(
                "pdf",
                "此 PDF 文件无法提取文本内容，可能是扫描版（需要 OCR）或已加密",
            ));
        }

        Ok(ParsedContent {
            title,
            author,
            page_count,
            full_text,
            chapters: Vec::new(),
        })
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}
