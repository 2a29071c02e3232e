use std::collections::HashMap;

use anyhow::Result;
use futures::{stream, StreamExt};
use tracing::{info, warn};

use crate::corpus::types::Question;
use crate::corpus::{is_chinese_text, Pool};

use super::relay::QuestionRewriter;

/// Gold documents shown to the rewriter per question.
const CONTEXT_DOCS: usize = 2;

/// Translated questions that still have no Chinese text. DRCD questions are
/// native and never selected.
pub fn questions_needing_repair(pool: &Pool) -> Vec<&Question> {
    pool.questions
        .iter()
        .filter(|q| !q.source_dataset.is_traditional_chinese() && !is_chinese_text(&q.question))
        .collect()
}

/// Replace question text by ID. Nothing else in the pool changes.
pub fn apply_question_text(pool: &Pool, rewrites: &HashMap<String, String>) -> Pool {
    let mut out = pool.clone();
    for q in out.questions.iter_mut() {
        if let Some(text) = rewrites.get(&q.question_id) {
            q.question = text.clone();
        }
    }
    out
}

/// Rewrite every question that failed to come out in Chinese. Returns the
/// repaired pool and how many questions changed.
pub async fn repair_questions<R: QuestionRewriter>(
    pool: &Pool,
    rewriter: &R,
    concurrency: usize,
) -> Result<(Pool, usize)> {
    let targets = questions_needing_repair(pool);
    if targets.is_empty() {
        info!("no questions need repair");
        return Ok((pool.clone(), 0));
    }
    info!(count = targets.len(), "repairing questions");

    let mut results = stream::iter(targets)
        .map(move |q| async move {
            let passages: Vec<&str> = q
                .gold_doc_ids
                .iter()
                .filter_map(|id| pool.document(id))
                .take(CONTEXT_DOCS)
                .map(|d| d.content.as_str())
                .collect();
            let text = rewriter.rewrite_question(q, &passages).await;
            (q, text)
        })
        .buffer_unordered(concurrency.max(1));

    let mut rewrites = HashMap::new();
    while let Some((q, text)) = results.next().await {
        let text = text?;
        let text = text.trim();
        if !is_chinese_text(text) {
            warn!(question_id = %q.question_id, "rewrite is still not Chinese, keeping original");
            continue;
        }
        info!(question_id = %q.question_id, "question repaired");
        rewrites.insert(q.question_id.clone(), text.to_string());
    }

    let repaired = rewrites.len();
    Ok((apply_question_text(pool, &rewrites), repaired))
}
