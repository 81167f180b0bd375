use super::*;
use encoding_rs::*;
use tracing::warn;

/// 编码检测采样字节数
const SAMPLE_SIZE: usize = 64 * 1024;

/// 每页估算字符数
const CHARS_PER_PAGE: usize = 2000;

/// TXT 解析器
///
/// 自动检测编码（UTF-8、UTF-16、GBK、Windows-1252），无法解码的字节直接丢弃
#[derive(Clone)]
pub struct TxtParser;

impl TxtParser {
    /// 创建新的 TXT 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 根据字节采样检测编码
    fn detect_encoding(&self, bytes: &[u8]) -> &'static Encoding {
        // 1. 检查 BOM (Byte Order Mark)
        if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
            return encoding;
        }

        let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];

        // 2. 尝试 UTF-8 解码（采样截断处可能切开多字节字符）
        match std::str::from_utf8(sample) {
            Ok(_) => return UTF_8,
            Err(e) if e.error_len().is_none() && sample.len() < bytes.len() => return UTF_8,
            Err(_) => {}
        }

        // 3. 检测是否为 GBK
        if self.looks_like_gbk(sample) {
            return GBK;
        }

        // 4. 其余按西文单字节编码处理
        WINDOWS_1252
    }

    /// 检测字节序列是否像 GBK 编码
    ///
    /// GBK 编码特征：
    /// - 第一字节范围：0x81-0xFE
    /// - 第二字节范围：0x40-0xFE
    fn looks_like_gbk(&self, bytes: &[u8]) -> bool {
        let mut gbk_pairs = 0;
        let mut total_pairs = 0;

        let mut i = 0;
        while i < bytes.len().saturating_sub(1) {
            let b1 = bytes[i];
            let b2 = bytes[i + 1];

            if b1 < 0x80 {
                i += 1;
                continue;
            }

            total_pairs += 1;

            if (0x81..=0xFE).contains(&b1) && (0x40..=0xFE).contains(&b2) {
                gbk_pairs += 1;
                i += 2;
            } else {
                i += 1;
            }
        }

        // 如果超过 50% 的非 ASCII 字节对符合 GBK 规则，则认为是 GBK
        total_pairs > 0 && (gbk_pairs as f32 / total_pairs as f32) > 0.5
    }

    /// 解码为字符串，丢弃无法解码的字节
    fn decode(&self, bytes: &[u8]) -> String {
        let encoding = self.detect_encoding(bytes);
        let (content, encoding_used, had_errors) = encoding.decode(bytes);
        if had_errors {
            warn!(encoding = encoding_used.name(), "文件解码时出现错误，已丢弃无法识别的字节");
            return content.chars().filter(|&c| c != '\u{FFFD}').collect();
        }
        content.into_owned()
    }

    /// 从文件名推导标题（下划线、连字符替换为空格）
    fn title_from_filename(&self, file_path: &Path) -> String {
        file_path
            .file_stem()
            .map(|s| s.to_string_lossy().replace('_', " ").replace('-', " "))
            .unwrap_or_default()
    }
}

impl Parser for TxtParser {
    fn parse(&self, file_path: &Path) -> Result<ParsedContent, ExtractError> {
        let bytes = fs::read(file_path).map_err(|e| ExtractError::failure("txt", e))?;
        let full_text = self.decode(&bytes);

        Ok(ParsedContent {
            title: self.title_from_filename(file_path),
            author: String::new(),
            page_count: full_text.chars().count() / CHARS_PER_PAGE,
            full_text,
            chapters: Vec::new(),
        })
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Txt
    }
}

impl Default for TxtParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_detect_utf8_encoding() {
        let parser = TxtParser::new();
        assert_eq!(parser.detect_encoding("测试文本".as_bytes()), UTF_8);
        assert_eq!(parser.detect_encoding(b"Hello World"), UTF_8);
    }

    #[test]
    fn test_detect_utf16_bom() {
        let parser = TxtParser::new();
        assert_eq!(parser.detect_encoding(&[0xFF, 0xFE, b'h', 0x00]), UTF_16LE);
    }

    #[test]
    fn test_looks_like_gbk() {
        let parser = TxtParser::new();

        // GBK 编码的 "测试" (0xB2E2 0xCAD4)
        let gbk_bytes = vec![0xB2, 0xE2, 0xCA, 0xD4];
        assert!(parser.looks_like_gbk(&gbk_bytes));
        assert_eq!(parser.detect_encoding(&gbk_bytes), GBK);

        assert!(!parser.looks_like_gbk(b"This is a test"));
    }

    #[test]
    fn test_latin1_fallback() {
        let parser = TxtParser::new();
        // "café" in Windows-1252
        let text = parser.decode(&[b'c', b'a', b'f', 0xE9]);
        assert_eq!(text, "café");
    }

    #[test]
    fn test_undecodable_bytes_are_dropped() {
        let parser = TxtParser::new();
        // UTF-16LE BOM followed by an unpaired surrogate
        let text = parser.decode(&[0xFF, 0xFE, b'o', 0x00, b'k', 0x00, 0x00, 0xD8]);
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_title_from_filename() {
        let parser = TxtParser::new();
        let title = parser.title_from_filename(Path::new("/tmp/the_old-man.txt"));
        assert_eq!(title, "the old man");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "my_book.txt", "Chapter 1: Hi\nhello world".as_bytes());

        let parsed = TxtParser::new().parse(&path).unwrap();
        assert_eq!(parsed.title, "my book");
        assert_eq!(parsed.full_text, "Chapter 1: Hi\nhello world");
        assert_eq!(parsed.page_count, 0);
        assert!(parsed.chapters.is_empty());
    }

    #[test]
    fn test_extract_txt_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let body = (1..=30)
            .map(|i| format!("Paragraph {} of a plain text file.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let path = write_file(&dir, "plain-notes.txt", body.as_bytes());

        let doc = ParserRouter::new().extract(&path, "txt").unwrap();
        assert_eq!(doc.format, DocumentFormat::Txt);
        assert_eq!(doc.title, "plain notes");
        assert_eq!(doc.filename, "plain-notes.txt");
        assert!(doc.word_count > 0);
        assert_eq!(doc.chapters.len(), 10);
        assert_eq!(doc.chapters[0].title, "Section 1");
    }
}
