//! Extract, assemble and bind as one stage, plus single-question replacement
//! over persisted raw artifacts.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::info;

use crate::assemble::binder::{bind_all, finalize, unbind_question};
use crate::assemble::{
    merge, negative_candidates, pad, pool_rng, shuffle_documents, trim_random_negatives,
};
use crate::corpus::registry::{derive_id, IdKind};
use crate::corpus::types::{Provenance, SourceDataset};
use crate::corpus::{ArtifactPaths, Pool};
use crate::error::PipelineError;
use crate::sources::{
    adapter_from_records, load_adapter, sample_replacement, sample_source, Passage,
    SamplingPolicy, SourceAdapter, SourceSample,
};
use crate::state::{PipelineConfig, RunContext};
use crate::validate::{validate, ValidateOptions, ValidationReport};

/// Loaded adapters for every source a run touches.
#[derive(Default)]
pub struct SourceSet {
    adapters: BTreeMap<SourceDataset, Box<dyn SourceAdapter>>,
}

impl SourceSet {
    /// Load each question source and negative source from `raw_dir`.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let mut set = Self::default();
        let wanted = config
            .per_source_quota
            .keys()
            .chain(config.negative_sources.iter());
        for source in wanted {
            if set.adapters.contains_key(source) {
                continue;
            }
            let adapter = load_adapter(*source, &config.raw_path(*source))?;
            set.adapters.insert(*source, adapter);
        }
        Ok(set)
    }

    pub fn insert_records(&mut self, source: SourceDataset, records: Vec<serde_json::Value>) {
        self.adapters
            .insert(source, adapter_from_records(source, records));
    }

    fn get(&self, source: SourceDataset) -> Result<&dyn SourceAdapter, PipelineError> {
        self.adapters
            .get(&source)
            .map(|a| a.as_ref())
            .ok_or_else(|| PipelineError::InvalidConfig(format!("no raw data loaded for {}", source)))
    }

    fn negatives(&self, config: &PipelineConfig) -> Result<Vec<Passage>, PipelineError> {
        let adapters = config
            .negative_sources
            .iter()
            .map(|s| self.get(*s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(negative_candidates(adapters))
    }
}

/// Untranslated artifacts of a successful run.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub pool: Pool,
    pub provenance: Provenance,
    pub report: ValidationReport,
}

/// Sample every source, assemble the pool, bind references and validate.
/// Nothing is written here; a failure leaves no trace.
pub fn build(config: &PipelineConfig, sources: &SourceSet) -> Result<BuildOutput, PipelineError> {
    let policy = SamplingPolicy {
        seed: config.random_seed,
        backfill: config.backfill,
    };
    let mut samples: Vec<(SourceDataset, SourceSample)> = Vec::new();
    for (source, quota) in &config.per_source_quota {
        let sample = sample_source(sources.get(*source)?, *quota, &policy)?;
        samples.push((*source, sample));
    }

    let mut ctx = RunContext::new();
    merge(&mut ctx, samples.iter().map(|(s, sample)| (*s, sample)))?;

    let mut rng = pool_rng(config.random_seed);
    pad(&mut ctx, sources.negatives(config)?, config.target_pool_size, &mut rng)?;
    shuffle_documents(&mut ctx, &mut rng);

    bind_all(&mut ctx, samples.iter().flat_map(|(_, s)| s.questions.iter()))?;
    let provenance = finalize(&mut ctx, config.random_seed, config.target_pool_size)?;
    let pool = ctx.finish();

    let report = validate(&pool, Some(&provenance), config, ValidateOptions::default())?;
    Ok(BuildOutput {
        pool,
        provenance,
        report,
    })
}

/// [`build`], then persist the raw artifacts.
pub fn build_and_save(
    config: &PipelineConfig,
    sources: &SourceSet,
    paths: &ArtifactPaths,
) -> Result<BuildOutput> {
    let output = build(config, sources)?;
    paths.save_raw(&output.pool, &output.provenance)?;
    info!(
        dir = %paths.dir().display(),
        documents = output.pool.documents.len(),
        questions = output.pool.questions.len(),
        "raw artifacts written"
    );
    Ok(output)
}

/// Swap `question_id` for an unused question from the same source and bring
/// the pool back to its target size.
pub fn replace_question(
    config: &PipelineConfig,
    sources: &SourceSet,
    pool: Pool,
    provenance: &Provenance,
    question_id: &str,
) -> Result<BuildOutput, PipelineError> {
    let source = pool
        .question(question_id)
        .map(|q| q.source_dataset)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown question {}", question_id)))?;

    let mut ctx = RunContext::restore(pool, provenance)?;
    unbind_question(&mut ctx, question_id)?;

    let candidate = sample_replacement(sources.get(source)?, config.random_seed, |c| {
        let id = derive_id(IdKind::Question, source, &c.question.original_id);
        id == question_id || ctx.registry.contains(&id)
    })
    .ok_or(PipelineError::InsufficientData {
        dataset: source,
        requested: 1,
        eligible: 0,
        excluded: 0,
        shortfall: 1,
    })?;
    info!(%source, old = question_id, original_id = %candidate.question.original_id, "replacement drawn");

    let sample = SourceSample {
        questions: vec![candidate.question],
        documents: candidate.documents,
    };
    merge(&mut ctx, [(source, &sample)])?;
    bind_all(&mut ctx, &sample.questions)?;

    let mut rng = pool_rng(config.random_seed);
    if ctx.pool.documents.len() > config.target_pool_size {
        trim_random_negatives(&mut ctx, config.target_pool_size, &mut rng)?;
    } else {
        pad(&mut ctx, sources.negatives(config)?, config.target_pool_size, &mut rng)?;
    }

    let provenance = finalize(&mut ctx, config.random_seed, config.target_pool_size)?;
    let pool = ctx.finish();
    let report = validate(&pool, Some(&provenance), config, ValidateOptions::default())?;
    Ok(BuildOutput {
        pool,
        provenance,
        report,
    })
}
