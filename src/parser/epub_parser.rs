use super::*;
use epub::doc::EpubDoc;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// 遇到这些标签结束时插入段落分隔
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote",
    "pre", "tr", "br",
];

/// 不输出文本的标签
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title"];

/// EPUB 解析器
///
/// 每个内容文档（spine 中的章节）去除标签后作为一个章节，
/// EPUB 自带章节结构，不经过章节检测器
#[derive(Clone)]
pub struct EpubParser;

impl EpubParser {
    /// 创建新的 EPUB 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 从 HTML 内容中提取章节标题
    ///
    /// 按 h1 → h2 → h3 的优先级取第一个非空标题
    fn extract_title_from_html(&self, document: &Html) -> Option<String> {
        for tag in &["h1", "h2", "h3"] {
            if let Ok(selector) = Selector::parse(tag) {
                if let Some(element) = document.select(&selector).next() {
                    let text = normalize_inline(&element.text().collect::<String>());
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
        }

        None
    }

    /// 去除标签，得到纯文本
    ///
    /// 优先取 body，没有 body 时取整个文档
    fn html_to_text(&self, document: &Html) -> String {
        let mut raw = String::new();

        let body = Selector::parse("body")
            .ok()
            .and_then(|selector| document.select(&selector).next());
        let root = body.unwrap_or_else(|| document.root_element());
        self.collect_text(&root, &mut raw);

        normalize_paragraphs(&raw)
    }

    /// 递归收集文本节点，块级元素之后补空行
    fn collect_text(&self, element: &ElementRef, out: &mut String) {
        let tag_name = element.value().name();
        if SKIPPED_TAGS.contains(&tag_name) {
            return;
        }

        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child_element) = ElementRef::wrap(child) {
                self.collect_text(&child_element, out);
            }
        }

        if BLOCK_TAGS.contains(&tag_name) {
            out.push_str("\n\n");
        }
    }
}

/// 折叠行内空白
fn normalize_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 每段折叠空白，段与段之间保留一个空行
fn normalize_paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(normalize_inline)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Parser for EpubParser {
    fn parse(&self, file_path: &Path) -> Result<ParsedContent, ExtractError> {
        let mut doc = EpubDoc::new(file_path).map_err(|e| ExtractError::failure("epub", e))?;

        let title = doc
            .mdata("title")
            .map(|item| item.value.clone())
            .unwrap_or_default();
        let author = doc
            .mdata("creator")
            .map(|item| item.value.clone())
            .unwrap_or_default();

        let mut chapters = Vec::new();
        let mut full_text = Vec::new();

        for i in 0..doc.get_num_chapters() {
            if !doc.set_current_chapter(i) {
                continue;
            }

            let Some((html_content, _mime)) = doc.get_current_str() else {
                continue;
            };

            let document = Html::parse_document(&html_content);
            let text = self.html_to_text(&document);
            if text.is_empty() {
                continue;
            }

            let chapter_title = self
                .extract_title_from_html(&document)
                .unwrap_or_else(|| format!("Chapter {}", chapters.len() + 1));

            debug!(index = i, title = %chapter_title, "EPUB 章节");

            full_text.push(text.clone());
            chapters.push(ChapterRaw::new(chapter_title, text));
        }

        Ok(ParsedContent {
            title,
            author,
            page_count: chapters.len(),
            full_text: full_text.join("\n\n"),
            chapters,
        })
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Epub
    }
}

impl Default for EpubParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Test Book</dc:title>
    <dc:creator>Ann Author</dc:creator>
    <dc:identifier id="bookid">urn:uuid:1234</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="blank" href="blank.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="blank"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

    const CH1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>ignored</title></head>
<body><h2>A Subtitle</h2><h1>The Beginning</h1><p>Once upon a time.</p><p>The end of one.</p></body></html>"#;

    const BLANK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>blank</title></head><body>  </body></html>"#;

    const CH2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>x</title></head>
<body><p>No heading here, just text.</p></body></html>"#;

    fn build_epub(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        for (name, body) in [
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", OPF),
            ("OEBPS/ch1.xhtml", CH1),
            ("OEBPS/blank.xhtml", BLANK),
            ("OEBPS/ch2.xhtml", CH2),
        ] {
            zip.start_file(name, stored).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_title_precedence() {
        let parser = EpubParser::new();

        let h1_after_h2 = Html::parse_document("<html><body><h2>二级</h2><h1>一级</h1></body></html>");
        assert_eq!(parser.extract_title_from_html(&h1_after_h2), Some("一级".to_string()));

        let h3_only = Html::parse_document("<html><body><h3>小节标题</h3><p>内容</p></body></html>");
        assert_eq!(parser.extract_title_from_html(&h3_only), Some("小节标题".to_string()));

        // title 标签与 h4 不参与
        let none = Html::parse_document(
            "<html><head><title>书名</title></head><body><h4>x</h4><p>内容</p></body></html>",
        );
        assert_eq!(parser.extract_title_from_html(&none), None);
    }

    #[test]
    fn test_html_to_text() {
        let parser = EpubParser::new();
        let html = Html::parse_document(
            "<html><head><title>T</title><style>p{}</style></head>\
             <body><h1>Title</h1><p>First   <b>bold</b> line.</p><p>Second.</p></body></html>",
        );

        assert_eq!(parser.html_to_text(&html), "Title\n\nFirst bold line.\n\nSecond.");
    }

    #[test]
    fn test_parse_epub_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        build_epub(&path);

        let parsed = EpubParser::new().parse(&path).unwrap();
        assert_eq!(parsed.title, "The Test Book");
        assert_eq!(parsed.author, "Ann Author");

        // 空白文档被跳过
        assert_eq!(parsed.chapters.len(), 2);
        assert_eq!(parsed.page_count, 2);
        assert_eq!(parsed.chapters[0].title, "The Beginning");
        assert!(parsed.chapters[0].content.contains("Once upon a time."));
        assert_eq!(parsed.chapters[1].title, "Chapter 2");
        assert!(parsed.full_text.contains("No heading here"));
    }

    #[test]
    fn test_epub_chapters_bypass_detector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        build_epub(&path);

        let doc = ParserRouter::new().extract(&path, "epub").unwrap();
        assert_eq!(doc.chapters.len(), 2);
        assert!(doc.word_count > 0);
    }

    #[test]
    fn test_invalid_epub() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.epub");
        fs::write(&path, b"not a zip").unwrap();

        let result = EpubParser::new().parse(&path);
        assert!(matches!(result, Err(ExtractError::ExtractionFailure { .. })));
    }
}
