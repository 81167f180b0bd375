use regex::Regex;
use tracing::debug;

use super::ChapterRaw;

/// 整篇文本作为单章节时使用的标题
pub const FULL_CONTENT_TITLE: &str = "Full Content";

/// 无章节标记时的目标分段数
const TARGET_SECTIONS: usize = 10;

/// 章节边界规则，按优先级排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    /// `Chapter N: ...`（区分大小写）
    ChapterHeading,
    /// `CHAPTER N` 等任意大小写
    ChapterHeadingAnyCase,
    /// `N. Title` 编号列表风格
    NumberedHeading,
    /// 回退：按空行段落均分
    ParagraphChunks,
}

/// 章节检测器
///
/// 依次尝试三种边界模式，采用第一个有匹配的模式，不跨模式合并。
/// 三种模式都没有匹配时，按空行切分段落并均分为约 10 个 "Section N"。
/// 对 EPUB 不调用（EPUB 自带章节结构）。
pub struct ChapterDetector {
    /// 章节标题匹配模式列表
    patterns: Vec<(BoundaryRule, Regex)>,
    paragraph_break: Regex,
    target_sections: usize,
}

impl ChapterDetector {
    /// 创建新的章节检测器实例
    pub fn new() -> Self {
        let patterns = vec![
            (
                BoundaryRule::ChapterHeading,
                Regex::new(r"(?m)^[ \t]*Chapter[ \t]+\d+[:\-\s]+").expect("章节模式"),
            ),
            (
                BoundaryRule::ChapterHeadingAnyCase,
                Regex::new(r"(?mi)^[ \t]*chapter[ \t]+\d+[:\-\s]+").expect("章节模式"),
            ),
            (
                BoundaryRule::NumberedHeading,
                Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+[A-Z][^.\n]+").expect("编号模式"),
            ),
        ];

        Self {
            patterns,
            paragraph_break: Regex::new(r"\n[ \t\r]*\n").expect("段落模式"),
            target_sections: TARGET_SECTIONS,
        }
    }

    /// 将全文切分为有序章节，至少返回一个章节
    pub fn detect(&self, text: &str) -> Vec<ChapterRaw> {
        self.detect_with_rule(text).1
    }

    /// 同 [`detect`](Self::detect)，同时返回生效的边界规则
    pub fn detect_with_rule(&self, text: &str) -> (BoundaryRule, Vec<ChapterRaw>) {
        for (rule, pattern) in &self.patterns {
            let chapters = self.split_by_pattern(text, pattern);
            if !chapters.is_empty() {
                debug!(?rule, chapters = chapters.len(), "章节边界识别成功");
                return (*rule, chapters);
            }
        }

        let sections = self.chunk_paragraphs(text);
        debug!(sections = sections.len(), "未发现章节标记，按段落均分");
        (BoundaryRule::ParagraphChunks, sections)
    }

    /// 按模式的匹配位置切分
    ///
    /// 每段从一个匹配开始，到下一个匹配（或文本末尾）结束；
    /// 第一行为标题，其余为正文。第一个匹配之前的文本不归入任何章节。
    fn split_by_pattern(&self, text: &str, pattern: &Regex) -> Vec<ChapterRaw> {
        let starts: Vec<usize> = pattern.find_iter(text).map(|m| m.start()).collect();

        starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                let chunk = text[start..end].trim();
                if chunk.is_empty() {
                    return None;
                }

                let (first_line, rest) = chunk.split_once('\n').unwrap_or((chunk, ""));
                let rest = rest.trim();
                // 只有标题行时，以整段作为正文，保证正文非空
                let content = if rest.is_empty() { chunk } else { rest };

                Some(ChapterRaw::new(first_line.trim(), content))
            })
            .collect()
    }

    /// 回退：按空行切分段落并均分为约 `target_sections` 段
    ///
    /// 全文只有空白时原样作为一个 "Full Content" 章节返回；
    /// 空字符串应由调用方先行拒绝（[`ParserRouter`](super::ParserRouter) 会这样做）
    pub fn chunk_paragraphs(&self, text: &str) -> Vec<ChapterRaw> {
        let paragraphs: Vec<&str> = self
            .paragraph_break
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if paragraphs.is_empty() {
            return vec![ChapterRaw::new(FULL_CONTENT_TITLE, text)];
        }

        let chunk_size = paragraphs.len().div_ceil(self.target_sections).max(1);

        paragraphs
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| ChapterRaw::new(format!("Section {}", i + 1), chunk.join("\n\n")))
            .collect()
    }
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// 将超长文本按词数切块
pub fn split_for_processing(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(max_words).map(|chunk| chunk.join(" ")).collect()
}
