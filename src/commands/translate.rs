use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::corpus::ArtifactPaths;
use crate::llm::LlmClient;
use crate::state::PipelineConfig;
use crate::translate::checkpoint::Checkpoint;
use crate::translate::relay::LlmTranslator;
use crate::translate::{translate_pool, RelayOptions};
use crate::validate::{validate, ValidateOptions};

pub async fn translate(config: &PipelineConfig) -> Result<()> {
    let paths = ArtifactPaths::new(&config.output_dir);
    let pool = paths.load_raw().context("Run `build` first")?;
    let provenance = paths.load_provenance()?;

    let llm = Arc::new(LlmClient::from_env()?);
    info!(model = llm.model(), "LLM client initialized");
    let translator = LlmTranslator::new(llm, config.max_retries);
    let checkpoint = Checkpoint::open(&config.checkpoint_dir).await?;

    let options = RelayOptions {
        batch_size: config.translation_batch_size,
        concurrency: config.translation_concurrency,
        max_batch_retries: config.max_batch_retries,
    };
    let (translated, stats) =
        translate_pool(&pool, provenance.as_ref(), &translator, options, Some(&checkpoint)).await?;
    info!(
        slots = stats.slots,
        reused = stats.reused,
        translated = stats.translated,
        batches = stats.batches,
        "Translation finished"
    );

    validate(
        &translated,
        provenance.as_ref(),
        config,
        ValidateOptions { check_language: true },
    )?;
    paths.save_translated(&translated)?;
    info!(dir = %paths.dir().display(), "translated artifacts written");
    Ok(())
}
