use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::corpus::types::Question;
use crate::llm::{with_retries, LlmClient, Message};

use super::prompts;
use super::{TranslationBatch, TranslationItem};

/// Text-in/text-out service keyed by caller-supplied IDs. Replies may come
/// back in any order and are matched by ID only.
#[allow(async_fn_in_trait)]
pub trait Translator {
    async fn translate_batch(&self, batch: &TranslationBatch) -> Result<Vec<TranslationItem>>;
}

/// Produces a replacement question text for a question that failed to translate.
#[allow(async_fn_in_trait)]
pub trait QuestionRewriter {
    async fn rewrite_question(&self, question: &Question, passages: &[&str]) -> Result<String>;
}

/// Chat-completion backed relay.
pub struct LlmTranslator {
    llm: Arc<LlmClient>,
    max_retries: u32,
}

impl LlmTranslator {
    pub fn new(llm: Arc<LlmClient>, max_retries: u32) -> Self {
        Self { llm, max_retries }
    }
}

impl Translator for LlmTranslator {
    async fn translate_batch(&self, batch: &TranslationBatch) -> Result<Vec<TranslationItem>> {
        let messages = [
            Message::system(prompts::TRANSLATE_SYSTEM_PROMPT),
            Message::user(prompts::translation_message(batch)),
        ];
        let messages = &messages;
        let llm = &self.llm;
        // A malformed reply is retried like a transport failure.
        let items = with_retries(self.max_retries, move || async move {
            let reply = llm.chat(messages, 0.3).await?;
            prompts::parse_translation_reply(&reply)
        })
        .await?;
        debug!(batch = %batch.label, requested = batch.items.len(), returned = items.len(), "batch translated");
        Ok(items)
    }
}

impl QuestionRewriter for LlmTranslator {
    async fn rewrite_question(&self, question: &Question, passages: &[&str]) -> Result<String> {
        let messages = [
            Message::system(prompts::REPAIR_SYSTEM_PROMPT),
            Message::user(prompts::repair_message(question, passages)),
        ];
        self.llm
            .chat_with_retries(&messages, 0.2, self.max_retries)
            .await
    }
}
