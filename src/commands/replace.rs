use anyhow::{Context, Result};
use tracing::info;

use crate::corpus::ArtifactPaths;
use crate::pipeline::{replace_question, SourceSet};
use crate::state::PipelineConfig;

pub fn replace(config: &PipelineConfig, question_id: &str) -> Result<()> {
    let paths = ArtifactPaths::new(&config.output_dir);
    let pool = paths.load_raw().context("Run `build` first")?;
    let provenance = paths
        .load_provenance()?
        .context("provenance.json is required to replace a question")?;
    let sources = SourceSet::load(config)?;

    let output = replace_question(config, &sources, pool, &provenance, question_id)?;
    paths.save_raw(&output.pool, &output.provenance)?;
    info!(
        question_id,
        "question replaced; rerun `translate` to translate the new material"
    );
    Ok(())
}
