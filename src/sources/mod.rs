pub mod download;
pub mod multihop;
pub mod passages;
pub mod single_hop;

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::corpus::types::SourceDataset;
use crate::error::PipelineError;

/// Pre-dedup identity of a sampled document: where it came from and what the
/// source dataset calls it. Questions point at documents through this key
/// until the binder resolves it to a pool doc_id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub source: SourceDataset,
    pub original_id: String,
}

impl DocKey {
    pub fn new(source: SourceDataset, original_id: impl Into<String>) -> Self {
        Self {
            source,
            original_id: original_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledDocument {
    pub key: DocKey,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledQuestion {
    pub source: SourceDataset,
    pub original_id: String,
    pub question: String,
    pub answer: String,
    pub gold: Vec<DocKey>,
    /// Distractors the dataset itself labels for this question.
    pub hard_negatives: Vec<DocKey>,
}

/// A question with every document it brings into the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub question: SampledQuestion,
    pub documents: Vec<SampledDocument>,
}

/// One sampling unit produced by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Eligible(Candidate),
    Ineligible {
        original_id: String,
        reason: &'static str,
    },
}

impl Unit {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Unit::Eligible(_))
    }
}

/// A raw passage usable as a random negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub source: SourceDataset,
    pub original_id: String,
    pub content: String,
}

/// Everything sampled from one source dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSample {
    pub questions: Vec<SampledQuestion>,
    pub documents: Vec<SampledDocument>,
}

impl SourceSample {
    fn push(&mut self, candidate: Candidate) {
        self.questions.push(candidate.question);
        self.documents.extend(candidate.documents);
    }
}

/// Normalizes one dataset's native records into sampling units.
pub trait SourceAdapter {
    fn source(&self) -> SourceDataset;

    /// Sampling units in dataset order. `rng` is only used where the format
    /// needs a choice inside a unit (e.g. one QA per shared context).
    fn units(&self, rng: &mut StdRng) -> Vec<Unit>;

    /// Every non-empty passage of the dataset, for random-negative padding.
    fn passages(&self) -> Vec<Passage>;
}

/// Read `path` (a JSON array) and wrap it in the adapter for `source`.
pub fn load_adapter(source: SourceDataset, path: &Path) -> Result<Box<dyn SourceAdapter>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read raw dataset {}", path.display()))?;
    let records: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Raw dataset {} is not a JSON array", path.display()))?;
    info!(%source, records = records.len(), path = %path.display(), "raw dataset loaded");
    Ok(adapter_from_records(source, records))
}

pub fn adapter_from_records(
    source: SourceDataset,
    records: Vec<serde_json::Value>,
) -> Box<dyn SourceAdapter> {
    match source {
        SourceDataset::Drcd | SourceDataset::Squad => {
            Box::new(single_hop::SingleHopAdapter::from_records(source, records))
        }
        SourceDataset::HotpotQa | SourceDataset::TwoWiki => {
            Box::new(multihop::MultiHopAdapter::from_records(source, records))
        }
        SourceDataset::Negative => Box::new(passages::PassageAdapter::from_records(records)),
    }
}

/// Deserialize each record, dropping (and counting) the ones that do not fit
/// the expected shape.
pub(crate) fn parse_records<T: serde::de::DeserializeOwned>(
    source: SourceDataset,
    records: Vec<serde_json::Value>,
) -> Vec<T> {
    let total = records.len();
    let parsed: Vec<T> = records
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if parsed.len() < total {
        warn!(%source, skipped = total - parsed.len(), "malformed raw records skipped");
    }
    parsed
}

/// RNG for one source, derived from the run seed and the source tag so each
/// source's draw is independent of the others' quotas.
pub fn source_rng(seed: u64, source: SourceDataset) -> StdRng {
    let tag = blake3::hash(source.as_str().as_bytes());
    let mut salt = [0u8; 8];
    salt.copy_from_slice(&tag.as_bytes()[..8]);
    StdRng::seed_from_u64(seed ^ u64::from_le_bytes(salt))
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingPolicy {
    pub seed: u64,
    /// Draw past ineligible units until the quota is met instead of failing.
    pub backfill: bool,
}

/// Select exactly `quota` questions from a source, without replacement.
///
/// Units are shuffled with the source RNG. Without backfill only the first
/// `quota` shuffled units are considered, and any ineligible unit among them
/// leaves the source short, which is fatal.
pub fn sample_source(
    adapter: &dyn SourceAdapter,
    quota: usize,
    policy: &SamplingPolicy,
) -> Result<SourceSample, PipelineError> {
    let source = adapter.source();
    let mut rng = source_rng(policy.seed, source);
    let mut units = adapter.units(&mut rng);
    let eligible_total = units.iter().filter(|u| u.is_eligible()).count();
    units.shuffle(&mut rng);

    let window = if policy.backfill {
        units.len()
    } else {
        quota.min(units.len())
    };

    let mut sample = SourceSample::default();
    let mut excluded = 0usize;
    for unit in units.into_iter().take(window) {
        if sample.questions.len() == quota {
            break;
        }
        match unit {
            Unit::Eligible(candidate) => sample.push(candidate),
            Unit::Ineligible {
                original_id,
                reason,
            } => {
                excluded += 1;
                debug!(%source, original_id, reason, "candidate excluded");
            }
        }
    }

    let selected = sample.questions.len();
    if selected < quota {
        warn!(%source, quota, selected, excluded, eligible_total, "source cannot fill its quota");
        return Err(PipelineError::InsufficientData {
            dataset: source,
            requested: quota,
            eligible: eligible_total,
            excluded,
            shortfall: quota - selected,
        });
    }

    info!(
        %source,
        questions = selected,
        documents = sample.documents.len(),
        excluded,
        "source sampled"
    );
    Ok(sample)
}

/// Draw one eligible candidate that `reject` does not veto. Used when a
/// single question is swapped out of an existing pool.
pub fn sample_replacement(
    adapter: &dyn SourceAdapter,
    seed: u64,
    mut reject: impl FnMut(&Candidate) -> bool,
) -> Option<Candidate> {
    let mut rng = source_rng(seed, adapter.source());
    let mut units = adapter.units(&mut rng);
    units.shuffle(&mut rng);
    units.into_iter().find_map(|unit| match unit {
        Unit::Eligible(c) if !reject(&c) => Some(c),
        _ => None,
    })
}

#[cfg(test)]
pub(crate) mod test_data {
    use serde_json::{json, Value};

    /// A flat SQuAD-style row.
    pub fn squad_row(id: &str, context: &str, question: &str, answer: &str) -> Value {
        json!({
            "id": id,
            "title": "T",
            "context": context,
            "question": question,
            "answers": {"text": [answer], "answer_start": [0]}
        })
    }

    /// A HotpotQA-style record with columnar context. `paragraphs` pairs a
    /// title with its text; `gold` names the supporting titles.
    pub fn multihop_record(id: &str, paragraphs: &[(&str, &str)], gold: &[&str]) -> Value {
        let titles: Vec<&str> = paragraphs.iter().map(|(t, _)| *t).collect();
        let sentences: Vec<Vec<&str>> = paragraphs.iter().map(|(_, s)| vec![*s]).collect();
        json!({
            "id": id,
            "question": format!("Question {}?", id),
            "answer": format!("Answer {}", id),
            "supporting_facts": {"title": gold, "sent_id": vec![0; gold.len()]},
            "context": {"title": titles, "sentences": sentences}
        })
    }
}
