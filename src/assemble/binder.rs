use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use crate::corpus::registry::IdKind;
use crate::corpus::types::{
    DocId, DocRole, Provenance, ProvenanceRecord, Question, QuestionId,
};
use crate::error::PipelineError;
use crate::sources::{DocKey, SampledQuestion};
use crate::state::{QuestionLinks, RunContext};

fn dangling(question_id: &str, key: &DocKey) -> PipelineError {
    PipelineError::DanglingReference {
        question_id: question_id.to_string(),
        doc_id: format!("{}:{}", key.source, key.original_id),
    }
}

/// Resolve pre-dedup keys to surviving doc_ids, keeping first-seen order.
fn resolve_keys(
    ctx: &RunContext,
    question_id: &str,
    keys: &[DocKey],
    exclude: &HashSet<DocId>,
) -> Result<Vec<DocId>, PipelineError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for key in keys {
        let id = ctx
            .aliases
            .get(key)
            .ok_or_else(|| dangling(question_id, key))?;
        if !exclude.contains(id) && seen.insert(id.clone()) {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}

/// Turn one sampled question into a pool `Question` pointing at post-dedup doc_ids.
pub fn bind_question(
    ctx: &mut RunContext,
    sampled: &SampledQuestion,
) -> Result<QuestionId, PipelineError> {
    let question_type = sampled.source.question_type().ok_or_else(|| {
        PipelineError::InvalidConfig(format!("{} cannot contribute questions", sampled.source))
    })?;
    let question_id =
        ctx.registry
            .allocate(IdKind::Question, sampled.source, &sampled.original_id)?;

    let gold = resolve_keys(ctx, &question_id, &sampled.gold, &HashSet::new())?;
    if gold.is_empty() {
        return Err(PipelineError::EmptyGoldSet { question_id });
    }
    let gold_set: HashSet<DocId> = gold.iter().cloned().collect();
    let hard_negatives = resolve_keys(ctx, &question_id, &sampled.hard_negatives, &gold_set)?;

    for id in gold.iter().chain(hard_negatives.iter()) {
        ctx.random_negatives.remove(id);
    }
    ctx.pool.questions.push(Question {
        question_id: question_id.clone(),
        question: sampled.question.clone(),
        gold_answer: sampled.answer.clone(),
        gold_doc_ids: gold.clone(),
        source_dataset: sampled.source,
        question_type,
    });
    ctx.links.insert(
        question_id.clone(),
        QuestionLinks {
            gold,
            hard_negatives,
        },
    );
    Ok(question_id)
}

pub fn bind_all<'a>(
    ctx: &mut RunContext,
    questions: impl IntoIterator<Item = &'a SampledQuestion>,
) -> Result<usize, PipelineError> {
    let mut bound = 0;
    for q in questions {
        bind_question(ctx, q)?;
        bound += 1;
    }
    info!(bound, "questions bound");
    Ok(bound)
}

/// Remove a question and every document that only it referenced.
/// Returns the removed doc_ids.
pub fn unbind_question(
    ctx: &mut RunContext,
    question_id: &str,
) -> Result<HashSet<DocId>, PipelineError> {
    if ctx.registry.resolve(question_id) != Some(IdKind::Question) {
        return Err(PipelineError::InvalidConfig(format!(
            "{} is not a question in this pool",
            question_id
        )));
    }
    let links = ctx.links.remove(question_id).unwrap_or_default();
    ctx.pool.questions.retain(|q| q.question_id != question_id);
    ctx.registry.release(question_id);

    let still_linked = ctx.linked_docs();
    let orphaned: HashSet<DocId> = links
        .gold
        .into_iter()
        .chain(links.hard_negatives)
        .filter(|id| !still_linked.contains(id.as_str()))
        .collect();
    super::remove_documents(ctx, &orphaned);
    info!(question_id, removed_documents = orphaned.len(), "question unbound");
    Ok(orphaned)
}

/// Check every reference, set `is_gold`, and derive per-document provenance.
pub fn finalize(
    ctx: &mut RunContext,
    random_seed: u64,
    target_pool_size: usize,
) -> Result<Provenance, PipelineError> {
    let present: HashSet<String> = ctx.pool.documents.iter().map(|d| d.doc_id.clone()).collect();

    let mut gold_for: BTreeMap<&str, Vec<QuestionId>> = BTreeMap::new();
    let mut hard_for: BTreeMap<&str, Vec<QuestionId>> = BTreeMap::new();
    for question in &ctx.pool.questions {
        if question.gold_doc_ids.is_empty() {
            return Err(PipelineError::EmptyGoldSet {
                question_id: question.question_id.clone(),
            });
        }
        for id in &question.gold_doc_ids {
            if !present.contains(id) {
                return Err(PipelineError::DanglingReference {
                    question_id: question.question_id.clone(),
                    doc_id: id.clone(),
                });
            }
            gold_for.entry(id.as_str()).or_default().push(question.question_id.clone());
        }
    }
    for (question_id, links) in &ctx.links {
        for id in &links.hard_negatives {
            if !present.contains(id) {
                return Err(PipelineError::DanglingReference {
                    question_id: question_id.clone(),
                    doc_id: id.clone(),
                });
            }
            hard_for.entry(id.as_str()).or_default().push(question_id.clone());
        }
    }

    let mut records = Vec::with_capacity(ctx.pool.documents.len());
    let mut orphans = Vec::new();
    for doc in &ctx.pool.documents {
        let gold = gold_for.get(doc.doc_id.as_str()).cloned().unwrap_or_default();
        let hard = hard_for.get(doc.doc_id.as_str()).cloned().unwrap_or_default();
        let role = if !gold.is_empty() {
            DocRole::Gold
        } else if !hard.is_empty() {
            DocRole::HardNegative
        } else {
            if !ctx.random_negatives.contains(&doc.doc_id) {
                orphans.push(doc.doc_id.clone());
            }
            DocRole::RandomNegative
        };
        records.push(ProvenanceRecord {
            doc_id: doc.doc_id.clone(),
            source: doc.original_source,
            role,
            gold_for: gold,
            hard_negative_for: hard,
        });
    }
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "unreferenced sampled documents counted as random negatives");
    }

    for doc in ctx.pool.documents.iter_mut() {
        doc.is_gold = gold_for.contains_key(doc.doc_id.as_str());
    }
    for record in &records {
        if record.role == DocRole::RandomNegative {
            ctx.random_negatives.insert(record.doc_id.clone());
        } else {
            ctx.random_negatives.remove(&record.doc_id);
        }
    }

    let provenance = Provenance {
        random_seed,
        target_pool_size,
        created_at: chrono::Utc::now().timestamp(),
        documents: records,
    };
    info!(
        gold = provenance.count_role(DocRole::Gold),
        hard_negatives = provenance.count_role(DocRole::HardNegative),
        random_negatives = provenance.count_role(DocRole::RandomNegative),
        identifiers = ctx.registry.len(),
        "cross-references bound"
    );
    Ok(provenance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::merge;
    use crate::corpus::types::SourceDataset;
    use crate::sources::{SampledDocument, SourceSample};

    fn hotpot_question(id: &str, gold: &[&str], hard: &[&str]) -> SampledQuestion {
        let key = |t: &&str| DocKey::new(SourceDataset::HotpotQa, format!("{}_{}", id, t));
        SampledQuestion {
            source: SourceDataset::HotpotQa,
            original_id: id.to_string(),
            question: format!("{}?", id),
            answer: "yes".to_string(),
            gold: gold.iter().map(key).collect(),
            hard_negatives: hard.iter().map(key).collect(),
        }
    }

    fn docs(id: &str, titles: &[(&str, &str)]) -> Vec<SampledDocument> {
        titles
            .iter()
            .map(|(t, text)| SampledDocument {
                key: DocKey::new(SourceDataset::HotpotQa, format!("{}_{}", id, t)),
                content: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_duplicate_gold_resolves_to_survivor() {
        let mut ctx = RunContext::new();
        let mut sample = SourceSample::default();
        sample.questions.push(hotpot_question("r1", &["Paris", "Seine"], &["Lyon"]));
        sample.questions.push(hotpot_question("r2", &["Paris", "Eiffel"], &[]));
        sample.documents.extend(docs(
            "r1",
            &[("Paris", "Paris is the capital."), ("Seine", "The Seine."), ("Lyon", "Lyon.")],
        ));
        sample.documents.extend(docs(
            "r2",
            &[("Paris", "Paris is the capital."), ("Eiffel", "The tower.")],
        ));
        merge(&mut ctx, [(SourceDataset::HotpotQa, &sample)]).unwrap();
        bind_all(&mut ctx, &sample.questions).unwrap();
        let provenance = finalize(&mut ctx, 11, 4).unwrap();

        assert_eq!(ctx.pool.documents.len(), 4);
        let q1 = &ctx.pool.questions[0];
        let q2 = &ctx.pool.questions[1];
        assert_eq!(q1.gold_doc_ids[0], q2.gold_doc_ids[0]);

        let paris = &q1.gold_doc_ids[0];
        let record = provenance.documents.iter().find(|r| &r.doc_id == paris).unwrap();
        assert_eq!(record.gold_for.len(), 2);
        assert_eq!(provenance.count_role(DocRole::Gold), 3);
        assert_eq!(provenance.count_role(DocRole::HardNegative), 1);
        assert_eq!(ctx.pool.documents.iter().filter(|d| d.is_gold).count(), 3);
    }

    #[test]
    fn test_unresolved_key_is_dangling() {
        let mut ctx = RunContext::new();
        let err = bind_question(&mut ctx, &hotpot_question("r9", &["Nowhere"], &[])).unwrap_err();
        match err {
            PipelineError::DanglingReference { doc_id, .. } => {
                assert_eq!(doc_id, "hotpotqa:r9_Nowhere")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbind_keeps_shared_documents() {
        let mut ctx = RunContext::new();
        let mut sample = SourceSample::default();
        sample.questions.push(hotpot_question("r1", &["Paris", "Seine"], &[]));
        sample.questions.push(hotpot_question("r2", &["Paris", "Eiffel"], &[]));
        sample.documents.extend(docs("r1", &[("Paris", "P."), ("Seine", "S.")]));
        sample.documents.extend(docs("r2", &[("Paris", "P."), ("Eiffel", "E.")]));
        merge(&mut ctx, [(SourceDataset::HotpotQa, &sample)]).unwrap();
        let ids: Vec<_> = sample
            .questions
            .iter()
            .map(|q| bind_question(&mut ctx, q).unwrap())
            .collect();

        let removed = unbind_question(&mut ctx, &ids[0]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(ctx.pool.documents.len(), 2);
        assert_eq!(ctx.pool.questions.len(), 1);
        assert!(!ctx.registry.contains(&ids[0]));
        finalize(&mut ctx, 11, 2).unwrap();
    }
}
