pub mod binder;

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::corpus::registry::IdKind;
use crate::corpus::types::{DocId, Document, SourceDataset};
use crate::corpus::{fingerprint, Pool};
use crate::error::PipelineError;
use crate::sources::{self, Passage, SampledDocument, SourceSample};
use crate::state::RunContext;

/// Counts reported by [`merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub deduplicated: usize,
}

/// RNG for padding and final ordering, independent of every question source.
pub fn pool_rng(seed: u64) -> StdRng {
    sources::source_rng(seed, SourceDataset::Negative)
}

/// `(source, content fingerprint) -> doc_id` for everything already pooled.
fn content_index(pool: &Pool) -> HashMap<(SourceDataset, String), DocId> {
    let mut index = HashMap::new();
    for doc in &pool.documents {
        index
            .entry((doc.original_source, fingerprint(&doc.content)))
            .or_insert_with(|| doc.doc_id.clone());
    }
    index
}

/// Append every sampled gold and hard-negative document to the pool.
///
/// A passage whose content exactly matches one already pooled from the same
/// source is dropped; its key is aliased to the first-seen copy so the binder
/// re-points references to the survivor.
pub fn merge<'a>(
    ctx: &mut RunContext,
    samples: impl IntoIterator<Item = (SourceDataset, &'a SourceSample)>,
) -> Result<MergeStats, PipelineError> {
    let mut index = content_index(&ctx.pool);
    let mut stats = MergeStats::default();

    for (source, sample) in samples {
        for doc in &sample.documents {
            if ctx.aliases.contains_key(&doc.key) {
                continue;
            }
            let fp = fingerprint(&doc.content);
            if let Some(kept) = index.get(&(source, fp.clone())) {
                debug!(%source, original_id = %doc.key.original_id, kept = %kept, "duplicate passage merged");
                // A passage that turns out to be referenced is no longer background.
                ctx.random_negatives.remove(kept);
                ctx.aliases.insert(doc.key.clone(), kept.clone());
                stats.deduplicated += 1;
                continue;
            }
            let doc_id = push_document(ctx, source, doc)?;
            index.insert((source, fp), doc_id);
            stats.added += 1;
        }
    }

    info!(
        added = stats.added,
        deduplicated = stats.deduplicated,
        pool = ctx.pool.documents.len(),
        "sampled documents merged"
    );
    Ok(stats)
}

fn push_document(
    ctx: &mut RunContext,
    source: SourceDataset,
    doc: &SampledDocument,
) -> Result<DocId, PipelineError> {
    let doc_id = ctx
        .registry
        .allocate(IdKind::Document, source, &doc.key.original_id)?;
    ctx.pool.documents.push(Document {
        doc_id: doc_id.clone(),
        content: doc.content.clone(),
        original_source: source,
        original_id: doc.key.original_id.clone(),
        is_gold: false,
    });
    ctx.aliases.insert(doc.key.clone(), doc_id.clone());
    Ok(doc_id)
}

/// Fill the pool up to `target` with random negatives drawn from `candidates`.
///
/// Candidates whose content matches any pooled document (any source) are
/// ineligible, as are blanks and repeats. Returns the number of documents
/// added. Nothing is added when the eligible candidates cannot cover the gap.
pub fn pad(
    ctx: &mut RunContext,
    candidates: Vec<Passage>,
    target: usize,
    rng: &mut StdRng,
) -> Result<usize, PipelineError> {
    let merged = ctx.pool.documents.len();
    let remaining = target
        .checked_sub(merged)
        .ok_or(PipelineError::PoolOverflow { merged, target })?;
    if remaining == 0 {
        return Ok(0);
    }

    let mut taken: HashSet<String> = ctx
        .pool
        .documents
        .iter()
        .map(|d| fingerprint(&d.content))
        .collect();
    let mut eligible: Vec<(String, Passage)> = Vec::new();
    for passage in candidates {
        if passage.content.trim().is_empty() {
            continue;
        }
        let fp = fingerprint(&passage.content);
        if taken.insert(fp.clone()) {
            eligible.push((fp, passage));
        }
    }

    if eligible.len() < remaining {
        return Err(PipelineError::InsufficientPadding {
            needed: remaining,
            available: eligible.len(),
        });
    }

    eligible.shuffle(rng);
    for (fp, passage) in eligible.into_iter().take(remaining) {
        let doc_id = ctx
            .registry
            .allocate(IdKind::Document, passage.source, &format!("neg:{}", fp))?;
        ctx.pool.documents.push(Document {
            doc_id: doc_id.clone(),
            content: passage.content,
            original_source: passage.source,
            original_id: passage.original_id,
            is_gold: false,
        });
        ctx.random_negatives.insert(doc_id);
    }

    info!(added = remaining, pool = ctx.pool.documents.len(), "random negatives padded");
    Ok(remaining)
}

/// Drop random negatives until the pool is no larger than `target`.
pub fn trim_random_negatives(
    ctx: &mut RunContext,
    target: usize,
    rng: &mut StdRng,
) -> Result<usize, PipelineError> {
    let merged = ctx.pool.documents.len();
    let excess = merged.saturating_sub(target);
    if excess == 0 {
        return Ok(0);
    }

    let linked = ctx.linked_docs();
    let mut removable: Vec<DocId> = ctx
        .random_negatives
        .iter()
        .filter(|id| !linked.contains(id.as_str()))
        .cloned()
        .collect();
    if removable.len() < excess {
        return Err(PipelineError::PoolOverflow { merged, target });
    }
    removable.sort();
    removable.shuffle(rng);

    let dropped: HashSet<DocId> = removable.into_iter().take(excess).collect();
    remove_documents(ctx, &dropped);
    info!(removed = excess, pool = ctx.pool.documents.len(), "random negatives trimmed");
    Ok(excess)
}

/// Remove documents from the pool and release their identifiers.
pub fn remove_documents(ctx: &mut RunContext, ids: &HashSet<DocId>) {
    ctx.pool.documents.retain(|d| !ids.contains(&d.doc_id));
    ctx.aliases.retain(|_, id| !ids.contains(id));
    for id in ids {
        ctx.random_negatives.remove(id);
        ctx.registry.release(id);
    }
}

/// Seeded permutation of the pool so document position carries no role signal.
pub fn shuffle_documents(ctx: &mut RunContext, rng: &mut StdRng) {
    ctx.pool.documents.shuffle(rng);
}

/// Every passage the negative sources offer, in a stable order.
pub fn negative_candidates<'a>(
    adapters: impl IntoIterator<Item = &'a dyn sources::SourceAdapter>,
) -> Vec<Passage> {
    adapters.into_iter().flat_map(|a| a.passages()).collect()
}
