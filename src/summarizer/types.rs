use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 摘要风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// 要点式简要摘要
    Concise,
    /// 全面详细的摘要
    #[default]
    Detailed,
    /// 分析主题、语气、人物发展
    Analytical,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Concise => "concise",
            Style::Detailed => "detailed",
            Style::Analytical => "analytical",
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(Style::Concise),
            "detailed" => Ok(Style::Detailed),
            "analytical" => Ok(Style::Analytical),
            other => Err(format!("未知的摘要风格: {}", other)),
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 人物
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: String,
    pub role: String,
}

/// 模型返回的单章分析结果（JSON）
///
/// `summary` 必须存在，其余字段缺失时取空值
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChapterAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub central_ideas: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub chapter_title: Option<String>,
}

/// 单章摘要
///
/// 写入缓存后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    /// 从 1 开始的章节序号
    pub chapter_number: usize,
    pub chapter_title: String,
    pub summary: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub central_ideas: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub word_count: usize,
}

/// 书籍基本信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInfo {
    pub title: String,
    pub author: String,
    pub total_chapters: usize,
    pub total_words: usize,
    pub total_pages: usize,
    pub estimated_reading_time_minutes: f64,
}

/// 体裁与主题分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeAnalysis {
    pub genre: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub emotional_journey: String,
}

impl ThemeAnalysis {
    /// 分析失败时使用的中性占位
    pub fn unavailable() -> Self {
        Self {
            genre: "Unknown".to_string(),
            themes: Vec::new(),
            tone: "Neutral".to_string(),
            mood: "Neutral".to_string(),
            emotional_journey: "Unable to analyze".to_string(),
        }
    }
}

/// 全书摘要
///
/// 每次调用 summarize_book 都生成新的实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub book_info: BookInfo,
    pub overall_summary: String,
    pub chapters: Vec<ChapterSummary>,
    /// 所有章节关键词的并集
    pub all_keywords: BTreeSet<String>,
    /// 按人名去重，后出现的记录覆盖先出现的
    pub all_characters: BTreeMap<String, Character>,
    pub overall_themes: ThemeAnalysis,
    pub style: Style,
    pub language: String,
    pub generated_at: DateTime<Utc>,
}

/// 名言摘录
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub quote: String,
    pub context: String,
    pub speaker: String,
}

/// 测验难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("未知的难度: {}", other)),
        }
    }
}

/// 测验题型
///
/// 反序列化时容忍大小写以及空格、连字符写法（如 "Multiple Choice"）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::ShortAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "true_false" => Ok(QuestionType::TrueFalse),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            other => Err(format!("未知的题型: {}", other)),
        }
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 测验题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    /// 只有选择题有选项
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}
