use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::corpus::registry::{IdKind, IdRegistry};
use crate::corpus::types::{DocId, DocRole, Provenance, QuestionId, SourceDataset};
use crate::corpus::Pool;
use crate::error::PipelineError;
use crate::sources::DocKey;

/// Inclusive band used by the advisory ratio checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: usize,
    pub max: usize,
}

impl CountRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, n: usize) -> bool {
        (self.min..=self.max).contains(&n)
    }
}

/// Where the download stage fetches a raw dataset from (Hugging Face
/// datasets-server coordinates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLocator {
    pub dataset: String,
    pub config: String,
    pub split: String,
}

impl DatasetLocator {
    fn new(dataset: &str, config: &str, split: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            config: config.to_string(),
            split: split.to_string(),
        }
    }
}

/// Pipeline parameters. Every field has a default, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub per_source_quota: BTreeMap<SourceDataset, usize>,
    pub target_pool_size: usize,
    pub gold_count_range: CountRange,
    pub hard_negative_range: CountRange,
    pub translation_concurrency: usize,
    pub translation_batch_size: usize,
    pub random_seed: u64,
    /// Keep drawing past ineligible candidates until the quota is met.
    pub backfill: bool,
    pub negative_sources: Vec<SourceDataset>,
    pub max_retries: u32,
    pub max_batch_retries: u32,
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub download_max_rows: Option<usize>,
    pub datasets: BTreeMap<SourceDataset, DatasetLocator>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let per_source_quota = BTreeMap::from([
            (SourceDataset::Drcd, 15),
            (SourceDataset::Squad, 15),
            (SourceDataset::HotpotQa, 10),
            (SourceDataset::TwoWiki, 10),
        ]);
        let datasets = BTreeMap::from([
            (
                SourceDataset::Drcd,
                DatasetLocator::new("voidful/drcd", "default", "test"),
            ),
            (
                SourceDataset::Squad,
                DatasetLocator::new("rajpurkar/squad", "plain_text", "validation"),
            ),
            (
                SourceDataset::HotpotQa,
                DatasetLocator::new("hotpotqa/hotpot_qa", "distractor", "validation"),
            ),
            (
                SourceDataset::TwoWiki,
                DatasetLocator::new("framolfese/2WikiMultihopQA", "default", "validation"),
            ),
        ]);
        Self {
            per_source_quota,
            target_pool_size: 500,
            gold_count_range: CountRange::new(50, 90),
            hard_negative_range: CountRange::new(100, 200),
            translation_concurrency: 8,
            translation_batch_size: 4,
            random_seed: 11,
            backfill: false,
            negative_sources: vec![SourceDataset::Squad, SourceDataset::Drcd],
            max_retries: 3,
            max_batch_retries: 2,
            raw_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/processed"),
            checkpoint_dir: PathBuf::from("data/checkpoint"),
            download_max_rows: None,
            datasets,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config {}", p.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", p.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.per_source_quota.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "per_source_quota names no sources".to_string(),
            ));
        }
        for (source, quota) in &self.per_source_quota {
            if source.question_type().is_none() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} cannot contribute questions",
                    source
                )));
            }
            if *quota == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "quota for {} must be at least 1",
                    source
                )));
            }
        }
        for (name, range) in [
            ("gold_count_range", self.gold_count_range),
            ("hard_negative_range", self.hard_negative_range),
        ] {
            if range.min > range.max {
                return Err(PipelineError::InvalidConfig(format!(
                    "{}: min {} exceeds max {}",
                    name, range.min, range.max
                )));
            }
        }
        if self.translation_concurrency == 0 || self.translation_batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "translation_concurrency and translation_batch_size must be at least 1"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn total_questions(&self) -> usize {
        self.per_source_quota.values().sum()
    }

    pub fn quota(&self, source: SourceDataset) -> usize {
        self.per_source_quota.get(&source).copied().unwrap_or(0)
    }

    pub fn raw_path(&self, source: SourceDataset) -> PathBuf {
        self.raw_dir.join(format!("{}.json", source))
    }
}

/// Document references one question carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionLinks {
    pub gold: Vec<DocId>,
    pub hard_negatives: Vec<DocId>,
}

/// Mutable state of one pipeline invocation. Passed explicitly to each stage
/// and consumed by [`RunContext::finish`].
#[derive(Debug, Default)]
pub struct RunContext {
    pub registry: IdRegistry,
    pub pool: Pool,
    /// Pre-dedup identity of every sampled document -> surviving doc_id.
    pub aliases: HashMap<DocKey, DocId>,
    pub links: BTreeMap<QuestionId, QuestionLinks>,
    pub random_negatives: HashSet<DocId>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from persisted raw artifacts. Every persisted ID is
    /// re-registered, so a duplicate in the files surfaces immediately.
    pub fn restore(pool: Pool, provenance: &Provenance) -> Result<Self, PipelineError> {
        let mut ctx = Self::new();
        for doc in &pool.documents {
            ctx.registry.register(IdKind::Document, &doc.doc_id)?;
        }
        for q in &pool.questions {
            ctx.registry.register(IdKind::Question, &q.question_id)?;
            ctx.links.insert(
                q.question_id.clone(),
                QuestionLinks {
                    gold: q.gold_doc_ids.clone(),
                    hard_negatives: Vec::new(),
                },
            );
        }
        for record in &provenance.documents {
            for qid in &record.hard_negative_for {
                if let Some(links) = ctx.links.get_mut(qid) {
                    links.hard_negatives.push(record.doc_id.clone());
                }
            }
            if record.role == DocRole::RandomNegative {
                ctx.random_negatives.insert(record.doc_id.clone());
            }
        }
        ctx.pool = pool;
        Ok(ctx)
    }

    /// Every doc_id referenced by any question, gold or hard negative.
    pub fn linked_docs(&self) -> HashSet<&str> {
        self.links
            .values()
            .flat_map(|l| l.gold.iter().chain(l.hard_negatives.iter()))
            .map(String::as_str)
            .collect()
    }

    /// End the run, discarding the registry and handing back the pool.
    pub fn finish(self) -> Pool {
        self.pool
    }
}
