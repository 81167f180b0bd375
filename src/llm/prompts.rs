//! 提示词模板
//!
//! 所有送给模型的正文都先按字符数截断

use crate::summarizer::{Difficulty, QuestionType, Style};

/// 全书摘要合成时，章节摘要拼接后的字符上限
pub const OVERALL_SUMMARY_INPUT_CHARS: usize = 15000;
/// 主题分析时，全文前缀的字符上限
pub const THEME_INPUT_CHARS: usize = 20000;
/// 对话种子上下文的字符上限
pub const CHAT_CONTEXT_CHARS: usize = 20000;

/// 对话开场时模型的固定回复
pub const CHAT_ACKNOWLEDGEMENT: &str = "I understand. I've read the book content you provided. \
Feel free to ask me any questions about it, and I'll answer based on the information given.";

/// 按字符（不是字节）截断
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn style_instruction(style: Style) -> &'static str {
    match style {
        Style::Concise => {
            "Provide a brief, concise summary in bullet points. Focus only on the most important information."
        }
        Style::Detailed => {
            "Provide a detailed summary with comprehensive coverage of all main points, themes, and important details."
        }
        Style::Analytical => {
            "Provide an analytical summary that includes themes, tone, emotions, character development, and deeper insights into the text."
        }
    }
}

pub fn chapter_summary(text: &str, style: Style, language: &str, max_chars: usize) -> String {
    format!(
        "Analyze and summarize the following text in {language}. {instruction}

Please provide a structured response in JSON format with the following fields:
- summary: The main summary text
- key_concepts: List of key concepts and subtopics (array of strings)
- keywords: Important keywords (array of strings)
- characters: List of characters with their roles (array of objects with 'name' and 'role')
- central_ideas: Main themes and ideas (array of strings)
- tone: Overall tone and emotion of the text
- chapter_title: A suggested title if this is a chapter (optional)

Text to analyze:
{text}

Respond ONLY with valid JSON, no additional text.",
        language = language,
        instruction = style_instruction(style),
        text = truncate_chars(text, max_chars),
    )
}

/// `combined` 是已按 "Chapter N: ..." 拼好的章节摘要
pub fn overall_summary(combined: &str, language: &str) -> String {
    format!(
        "Based on the following chapter summaries, create a comprehensive overall summary of the entire book in {language}:

{summaries}

Provide a cohesive summary that captures the main narrative, themes, and key points of the entire book.",
        language = language,
        summaries = truncate_chars(combined, OVERALL_SUMMARY_INPUT_CHARS),
    )
}

pub fn theme_detection(text: &str, max_chars: usize) -> String {
    format!(
        "Analyze the following text and identify:
- Primary genre (e.g., fiction, non-fiction, mystery, romance, science fiction, etc.)
- Main themes (e.g., love, betrayal, redemption, survival, etc.)
- Overall tone/mood (e.g., suspenseful, romantic, dark, hopeful, etc.)
- Emotional journey of the text

Text:
{text}

Respond with JSON:
{{
  \"genre\": \"primary genre\",
  \"themes\": [\"theme1\", \"theme2\", \"theme3\"],
  \"tone\": \"overall tone\",
  \"mood\": \"overall mood\",
  \"emotional_journey\": \"brief description\"
}}

Respond ONLY with valid JSON, no additional text.",
        text = truncate_chars(text, max_chars.min(THEME_INPUT_CHARS)),
    )
}

pub fn quiz(
    text: &str,
    difficulty: Difficulty,
    num_questions: usize,
    question_types: &[QuestionType],
    max_chars: usize,
) -> String {
    let types = question_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Generate {num} quiz questions from the following text.
Difficulty level: {difficulty}
Question types to include: {types}

For each question, provide:
- type: question type (multiple_choice, true_false, or short_answer)
- question: the question text
- options: array of options (for multiple_choice, should have 4 options)
- correct_answer: the correct answer
- explanation: brief explanation of why this is correct

Text:
{text}

Respond ONLY with valid JSON array, no additional text.
Format:
[
  {{
    \"type\": \"multiple_choice\",
    \"question\": \"Question text?\",
    \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],
    \"correct_answer\": \"Option A\",
    \"explanation\": \"Explanation text\"
  }}
]",
        num = num_questions,
        difficulty = difficulty.as_str(),
        types = types,
        text = truncate_chars(text, max_chars),
    )
}

pub fn quotes(text: &str, num_quotes: usize, max_chars: usize) -> String {
    format!(
        "Extract {num} most memorable, meaningful, or impactful quotes from the following text.
For each quote, provide the quote text and a brief context about why it's significant.

Text:
{text}

Respond with a JSON array:
[
  {{
    \"quote\": \"The actual quote text\",
    \"context\": \"Why this quote is significant\",
    \"speaker\": \"Who said it (if applicable)\"
  }}
]

Respond ONLY with valid JSON, no additional text.",
        num = num_quotes,
        text = truncate_chars(text, max_chars),
    )
}

pub fn translate(text: &str, target_language: &str, max_chars: usize) -> String {
    format!(
        "Translate the following text to {language}. Maintain the original meaning, tone, and style.

Text:
{text}

Provide ONLY the translation, no additional commentary.",
        language = target_language,
        text = truncate_chars(text, max_chars),
    )
}

pub fn rewrite_tone(text: &str, target_tone: &str, max_chars: usize) -> String {
    format!(
        "Rewrite the following text in a {tone} tone while maintaining the core information and meaning.

Original text:
{text}

Provide ONLY the rewritten text, no additional commentary.",
        tone = target_tone,
        text = truncate_chars(text, max_chars),
    )
}

/// 对话开场的用户消息，携带书籍内容
pub fn chat_seed(context: &str) -> String {
    format!(
        "I'm going to ask you questions about this book. Here's the content:\n\n{}",
        truncate_chars(context, CHAT_CONTEXT_CHARS)
    )
}
