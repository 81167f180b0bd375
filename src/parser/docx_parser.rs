use super::*;
use docx_rust::core::Core;
use docx_rust::document::{BodyContent, Paragraph, ParagraphContent, Run, RunContent};
use docx_rust::DocxFile;

/// 每页估算段落数
const PARAGRAPHS_PER_PAGE: usize = 50;

/// DOCX 解析器
///
/// 拼接所有非空段落，不做章节识别（交给章节检测器）
#[derive(Clone)]
pub struct DocxParser;

impl DocxParser {
    /// 创建新的 DOCX 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 收集正文中的段落文本（包括内容控件中的段落）
    fn collect_paragraphs(&self, content: &[BodyContent], out: &mut Vec<String>) {
        for item in content {
            match item {
                BodyContent::Paragraph(para) => {
                    let text = paragraph_text(para);
                    if !text.trim().is_empty() {
                        out.push(text);
                    }
                }
                BodyContent::Sdt(sdt) => {
                    if let Some(ref sdt_content) = sdt.content {
                        self.collect_paragraphs(&sdt_content.content, out);
                    }
                }
                _ => {}
            }
        }
    }
}

fn run_text(run: &Run) -> String {
    let mut text = String::new();
    for rc in &run.content {
        match rc {
            RunContent::Text(t) => text.push_str(&t.text),
            RunContent::Break(_) => text.push('\n'),
            RunContent::Tab(_) => text.push('\t'),
            _ => {}
        }
    }
    text
}

fn paragraph_text(para: &Paragraph) -> String {
    let mut text = String::new();
    for pc in &para.content {
        match pc {
            ParagraphContent::Run(run) => text.push_str(&run_text(run)),
            ParagraphContent::Link(link) => {
                if let Some(ref run) = link.content {
                    text.push_str(&run_text(run));
                }
            }
            _ => {}
        }
    }
    text
}

impl Parser for DocxParser {
    fn parse(&self, file_path: &Path) -> Result<ParsedContent, ExtractError> {
        let file = DocxFile::from_file(file_path).map_err(|e| ExtractError::failure("docx", e))?;
        let docx = file.parse().map_err(|e| ExtractError::failure("docx", e))?;

        let (title, author) = match &docx.core {
            Some(Core::CoreNamespace(c)) => (
                c.title.as_deref().unwrap_or_default().to_string(),
                c.creator.as_deref().unwrap_or_default().to_string(),
            ),
            Some(Core::CoreNoNamespace(c)) => (
                c.title.as_deref().unwrap_or_default().to_string(),
                c.creator.as_deref().unwrap_or_default().to_string(),
            ),
            None => (String::new(), String::new()),
        };

        let mut paragraphs = Vec::new();
        self.collect_paragraphs(&docx.document.body.content, &mut paragraphs);

        Ok(ParsedContent {
            title,
            author,
            page_count: paragraphs.len() / PARAGRAPHS_PER_PAGE,
            full_text: paragraphs.join("\n\n"),
            chapters: Vec::new(),
        })
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

    const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

    fn document_xml(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
    }

    fn build_docx(path: &Path, paragraphs: &[&str]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        for (name, body) in [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", RELS.to_string()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
            ("word/document.xml", document_xml(paragraphs)),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_docx_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        build_docx(&path, &["Chapter 1: Opening", "", "First body line.", "Chapter 2: Closing", "Last line."]);

        let parsed = DocxParser::new().parse(&path).unwrap();
        assert_eq!(
            parsed.full_text,
            "Chapter 1: Opening\n\nFirst body line.\n\nChapter 2: Closing\n\nLast line."
        );
        assert_eq!(parsed.page_count, 0);
        assert!(parsed.chapters.is_empty());
    }

    #[test]
    fn test_docx_falls_through_to_detector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        build_docx(&path, &["Chapter 1: Opening", "First body line.", "Chapter 2: Closing", "Last line."]);

        let doc = ParserRouter::new().extract(&path, "docx").unwrap();
        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[1].title, "Chapter 2: Closing");
        assert_eq!(doc.word_count, 11);
    }

    #[test]
    fn test_invalid_docx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.docx");
        fs::write(&path, b"garbage").unwrap();

        let result = DocxParser::new().parse(&path);
        assert!(matches!(result, Err(ExtractError::ExtractionFailure { .. })));
    }
}
