// Summarizer 模块
// 按章节调用模型生成摘要，汇总成全书摘要，并提供测验、摘录、翻译和对话

pub mod chat;
pub mod types;


use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::cache::{Fingerprint, SummaryCache};
use crate::config::Config;
use crate::error::LlmError;
use crate::llm::prompts::{self, truncate_chars, THEME_INPUT_CHARS};
use crate::llm::{parse_structured, try_parse_structured, ChatMessage, LlmCapability};
use crate::parser::chapter_detector::FULL_CONTENT_TITLE;
use crate::parser::{ChapterRaw, ExtractedDocument};

pub use chat::{ChatSessions, Conversation};
pub use types::*;

/// 进度回调：(百分比 0..=100, 说明)
pub type ProgressFn<'a> = &'a (dyn Fn(f64, &str) + Send + Sync);

/// 摘要编排器
pub struct Summarizer {
    llm: Arc<dyn LlmCapability>,
    cache: SummaryCache,
    chats: ChatSessions,
    max_chars_per_request: usize,
    max_concurrent_chapters: usize,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmCapability>, cache: SummaryCache) -> Self {
        let defaults = Config::default();
        Self {
            llm,
            cache,
            chats: ChatSessions::new(),
            max_chars_per_request: defaults.max_chars_per_request,
            max_concurrent_chapters: defaults.max_concurrent_chapters,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmCapability>, config: &Config) -> Self {
        Self::new(
            llm,
            SummaryCache::new(config.cache_dir.clone(), config.enable_cache),
        )
        .with_max_chars(config.max_chars_per_request)
        .with_concurrency(config.max_concurrent_chapters)
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars_per_request = max_chars;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrent_chapters = limit.max(1);
        self
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn chats(&self) -> &ChatSessions {
        &self.chats
    }

    /// 生成全书摘要
    ///
    /// 任何一章摘要失败都会中止整本书；主题分析失败只会退回占位结果
    pub async fn summarize_book(
        &self,
        doc: &ExtractedDocument,
        style: Style,
        language: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<BookSummary, LlmError> {
        let report = |percent: f64, message: &str| {
            if let Some(callback) = progress {
                callback(percent, message);
            }
        };

        // 没有章节时把全文当作一章
        let full_content;
        let chapters: &[ChapterRaw] = if doc.chapters.is_empty() {
            full_content = [ChapterRaw {
                title: FULL_CONTENT_TITLE.to_string(),
                content: doc.full_text.clone(),
                word_count: doc.word_count,
            }];
            &full_content
        } else {
            &doc.chapters
        };
        let total = chapters.len();

        info!(
            title = %doc.title,
            chapters = total,
            style = %style,
            language,
            "开始生成全书摘要"
        );

        // 按文档顺序产出，最多同时处理 max_concurrent_chapters 章
        let chapter_summaries: Vec<ChapterSummary> = stream::iter(chapters.iter().enumerate())
            .map(|(index, chapter)| {
                let report = &report;
                async move {
                    report(
                        index as f64 / total as f64 * 100.0,
                        &format!("Processing {}...", chapter.title),
                    );
                    self.chapter_summary(index, chapter, style, language).await
                }
            })
            .buffered(self.max_concurrent_chapters)
            .try_collect()
            .await?;

        let (all_keywords, all_characters) = aggregate(&chapter_summaries);

        let overall_summary = if chapter_summaries.len() > 1 {
            self.overall_summary(&chapter_summaries, language).await?
        } else {
            chapter_summaries
                .first()
                .map(|c| c.summary.clone())
                .unwrap_or_default()
        };

        report(95.0, "Analyzing themes...");
        let overall_themes = self.detect_themes(&doc.full_text).await;

        report(100.0, "Complete!");

        Ok(BookSummary {
            book_info: book_info(doc, total),
            overall_summary,
            chapters: chapter_summaries,
            all_keywords,
            all_characters,
            overall_themes,
            style,
            language: language.to_string(),
            generated_at: Utc::now(),
        })
    }

    /// 单独摘要一段章节文本（同样走缓存）
    pub async fn summarize_chapter(
        &self,
        text: &str,
        style: Style,
        language: &str,
    ) -> Result<ChapterSummary, LlmError> {
        self.chapter_summary(0, &ChapterRaw::new("", text), style, language)
            .await
    }

    /// 缓存命中直接复用，否则调用模型并写入缓存
    ///
    /// 缓存里存的是与位置无关的摘要（序号为 0，标题只保留模型建议的标题），
    /// 返回前再按本章位置和标题盖章
    async fn chapter_summary(
        &self,
        index: usize,
        chapter: &ChapterRaw,
        style: Style,
        language: &str,
    ) -> Result<ChapterSummary, LlmError> {
        let fingerprint = Fingerprint::chapter(&chapter.content, style, language);
        if let Some(cached) = self.cache.get::<ChapterSummary>(&fingerprint) {
            debug!(chapter = index + 1, "章节摘要来自缓存");
            return Ok(stamp(cached, index, chapter));
        }

        let prompt =
            prompts::chapter_summary(&chapter.content, style, language, self.max_chars_per_request);
        let raw = self.llm.generate(&prompt).await?;
        let analysis: ChapterAnalysis = try_parse_structured(&raw)?;

        let unplaced = ChapterSummary {
            chapter_number: 0,
            chapter_title: analysis.chapter_title.unwrap_or_default(),
            summary: analysis.summary,
            key_concepts: analysis.key_concepts,
            keywords: analysis.keywords,
            characters: analysis.characters,
            central_ideas: analysis.central_ideas,
            tone: analysis.tone,
            word_count: chapter.word_count,
        };

        self.cache.put(&fingerprint, &unplaced);
        Ok(stamp(unplaced, index, chapter))
    }

    /// 把各章摘要合成一篇全书摘要
    async fn overall_summary(
        &self,
        chapters: &[ChapterSummary],
        language: &str,
    ) -> Result<String, LlmError> {
        let combined = chapters
            .iter()
            .map(|c| format!("Chapter {}: {}", c.chapter_number, c.summary))
            .collect::<Vec<_>>()
            .join("\n\n");
        let combined = truncate_chars(&combined, prompts::OVERALL_SUMMARY_INPUT_CHARS);

        let fingerprint = Fingerprint::of_parts(&["overall", combined, language]);
        if let Some(cached) = self.cache.get::<String>(&fingerprint) {
            return Ok(cached);
        }

        let text = self
            .llm
            .generate(&prompts::overall_summary(combined, language))
            .await?;
        self.cache.put(&fingerprint, &text);
        Ok(text)
    }

    /// 体裁与主题分析，任何失败都退回占位结果
    async fn detect_themes(&self, full_text: &str) -> ThemeAnalysis {
        let sample = truncate_chars(full_text, THEME_INPUT_CHARS);
        let fingerprint = Fingerprint::of_parts(&["themes", sample]);
        if let Some(cached) = self.cache.get::<ThemeAnalysis>(&fingerprint) {
            return cached;
        }

        let prompt = prompts::theme_detection(sample, self.max_chars_per_request);
        let result = match self.llm.generate(&prompt).await {
            Ok(raw) => try_parse_structured::<ThemeAnalysis>(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(themes) => {
                self.cache.put(&fingerprint, &themes);
                themes
            }
            Err(e) => {
                warn!(error = %e, "主题分析失败，使用占位结果");
                ThemeAnalysis::unavailable()
            }
        }
    }

    /// 摘录名言；模型输出无法解析时返回空列表
    pub async fn extract_quotes(&self, text: &str, num_quotes: usize) -> Result<Vec<Quote>, LlmError> {
        let raw = self
            .llm
            .generate(&prompts::quotes(text, num_quotes, self.max_chars_per_request))
            .await?;
        Ok(parse_structured(&raw, Vec::new()))
    }

    /// 生成测验题；`question_types` 为空时包含全部题型
    ///
    /// 模型输出整体无法解析时返回空列表
    pub async fn generate_quiz(
        &self,
        text: &str,
        difficulty: Difficulty,
        num_questions: usize,
        question_types: &[QuestionType],
    ) -> Result<Vec<QuizQuestion>, LlmError> {
        let types: &[QuestionType] = if question_types.is_empty() {
            &QuestionType::ALL
        } else {
            question_types
        };

        let prompt = prompts::quiz(text, difficulty, num_questions, types, self.max_chars_per_request);
        let raw = self.llm.generate(&prompt).await?;

        // 逐题解析，个别题目格式不对只丢弃该题
        let items: Vec<serde_json::Value> = parse_structured(&raw, Vec::new());
        let total = items.len();
        let quiz: Vec<QuizQuestion> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if quiz.len() < total {
            warn!(dropped = total - quiz.len(), "丢弃无法解析的测验题");
        }
        Ok(quiz)
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String, LlmError> {
        self.llm
            .generate(&prompts::translate(text, target_language, self.max_chars_per_request))
            .await
    }

    pub async fn rewrite_tone(&self, text: &str, target_tone: &str) -> Result<String, LlmError> {
        self.llm
            .generate(&prompts::rewrite_tone(text, target_tone, self.max_chars_per_request))
            .await
    }

    /// 开始一段关于某本书的对话，返回会话 ID
    pub async fn start_chat(&self, book_id: &str, context: &str) -> String {
        self.chats.start(book_id, context).await
    }

    /// 在已有会话中提问
    ///
    /// 同一会话的消息串行处理；模型调用失败时历史不变
    pub async fn send_chat_message(&self, session_id: &str, message: &str) -> Result<String, LlmError> {
        let conversation = self
            .chats
            .get(session_id)
            .await
            .ok_or_else(|| LlmError::SessionNotFound(session_id.to_string()))?;

        let mut conversation = conversation.lock().await;
        let mut history = conversation.history.clone();
        history.push(ChatMessage::user(message));

        let reply = self.llm.converse(&history).await?;

        history.push(ChatMessage::model(reply.clone()));
        conversation.history = history;
        Ok(reply)
    }

    pub async fn end_chat(&self, session_id: &str) -> bool {
        self.chats.end(session_id).await
    }
}

/// 按章节位置盖上序号和标题
///
/// 标题优先取章节自身标题，其次模型建议的标题，最后是 "Chapter n"
fn stamp(mut summary: ChapterSummary, index: usize, chapter: &ChapterRaw) -> ChapterSummary {
    let number = index + 1;
    let title = [chapter.title.as_str(), summary.chapter_title.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Chapter {}", number));
    summary.chapter_title = title;
    summary.chapter_number = number;
    summary.word_count = chapter.word_count;
    summary
}

/// 汇总关键词与人物
fn aggregate(chapters: &[ChapterSummary]) -> (BTreeSet<String>, BTreeMap<String, Character>) {
    let mut keywords = BTreeSet::new();
    let mut characters = BTreeMap::new();

    for chapter in chapters {
        keywords.extend(
            chapter
                .keywords
                .iter()
                .filter(|k| !k.trim().is_empty())
                .cloned(),
        );
        for character in &chapter.characters {
            if character.name.trim().is_empty() {
                continue;
            }
            characters.insert(character.name.clone(), character.clone());
        }
    }

    (keywords, characters)
}

fn book_info(doc: &ExtractedDocument, total_chapters: usize) -> BookInfo {
    let title = if doc.title.trim().is_empty() {
        doc.filename.clone()
    } else {
        doc.title.clone()
    };
    let author = if doc.author.trim().is_empty() {
        "Unknown".to_string()
    } else {
        doc.author.clone()
    };

    BookInfo {
        title,
        author,
        total_chapters,
        total_words: doc.word_count,
        total_pages: doc.page_count,
        estimated_reading_time_minutes: doc.estimated_reading_time,
    }
}
