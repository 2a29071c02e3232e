use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::corpus::ArtifactPaths;
use crate::llm::LlmClient;
use crate::state::PipelineConfig;
use crate::translate::relay::LlmTranslator;
use crate::translate::repair::repair_questions;
use crate::validate::{validate, ValidateOptions};

pub async fn repair(config: &PipelineConfig) -> Result<()> {
    let paths = ArtifactPaths::new(&config.output_dir);
    let pool = paths.load_translated().context("Run `translate` first")?;
    let provenance = paths.load_provenance()?;

    let rewriter = LlmTranslator::new(Arc::new(LlmClient::from_env()?), config.max_retries);
    let (repaired, changed) =
        repair_questions(&pool, &rewriter, config.translation_concurrency).await?;
    if changed == 0 {
        return Ok(());
    }

    validate(
        &repaired,
        provenance.as_ref(),
        config,
        ValidateOptions { check_language: true },
    )?;
    paths.save_translated(&repaired)?;
    info!(changed, "repaired questions written");
    Ok(())
}
