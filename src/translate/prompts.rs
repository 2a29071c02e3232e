use crate::corpus::types::Question;

use super::{TranslationBatch, TranslationItem};

pub const TRANSLATE_SYSTEM_PROMPT: &str = r#"You are a professional translator. Translate the text of every item into Traditional Chinese as written in Taiwan (zh-TW).

Rules:
- Keep the tone and meaning of the original. Translate questions as questions. Never answer, summarize or explain them.
- The first time a proper noun (person, place, organization, work title) appears in an item, write its Chinese rendering followed by the original in parentheses, e.g. 艾菲爾鐵塔（Eiffel Tower）.
- When a glossary is given, render each listed name the same way in every item.
- Leave numbers, years and units exactly as written.
- If an item's text is already Chinese, return it unchanged.

Input is a JSON array of objects with "id" and "text".
Reply with ONLY a JSON array containing one object per input item, each with the same "id" and the translated "text". Do not add, drop or rename ids. No commentary, no code fences."#;

pub const REPAIR_SYSTEM_PROMPT: &str = r#"You rewrite benchmark questions. The question you are given was supposed to be in Traditional Chinese (Taiwan) but is not.

Write one natural Traditional Chinese (Taiwan) question that:
- asks for exactly the given answer,
- can be answered from the given passages,
- keeps proper nouns recognizable (Chinese rendering with the original in parentheses).

Reply with ONLY the question text."#;

/// User message for one translation batch: optional glossary, then the items.
pub fn translation_message(batch: &TranslationBatch) -> String {
    let mut out = String::new();
    if !batch.glossary.is_empty() {
        out.push_str("Glossary (translate consistently):\n");
        for term in &batch.glossary {
            out.push_str("- ");
            out.push_str(term);
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str("Items:\n");
    out.push_str(&serde_json::to_string(&batch.items).unwrap_or_else(|_| "[]".to_string()));
    out
}

/// Pull the JSON array out of a model reply, tolerating code fences and chatter
/// around it.
pub fn parse_translation_reply(reply: &str) -> anyhow::Result<Vec<TranslationItem>> {
    let start = reply
        .find('[')
        .ok_or_else(|| anyhow::anyhow!("reply contains no JSON array"))?;
    let end = reply
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow::anyhow!("reply JSON array is not closed"))?;
    let items: Vec<TranslationItem> = serde_json::from_str(&reply[start..=end])?;
    Ok(items)
}

pub fn repair_message(question: &Question, passages: &[&str]) -> String {
    let mut out = format!(
        "Question: {}\nAnswer: {}\n",
        question.question, question.gold_answer
    );
    for (i, passage) in passages.iter().enumerate() {
        out.push_str(&format!("\nPassage {}:\n{}\n", i + 1, passage));
    }
    out
}
