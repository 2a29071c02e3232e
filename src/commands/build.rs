use anyhow::Result;
use tracing::info;

use crate::corpus::ArtifactPaths;
use crate::pipeline::{build_and_save, SourceSet};
use crate::state::PipelineConfig;

pub fn build(config: &PipelineConfig) -> Result<()> {
    info!(
        questions = config.total_questions(),
        target_pool_size = config.target_pool_size,
        seed = config.random_seed,
        "Build started"
    );
    let sources = SourceSet::load(config)?;
    let paths = ArtifactPaths::new(&config.output_dir);
    let output = build_and_save(config, &sources, &paths)?;

    for (source, count) in &output.report.per_source {
        info!(%source, questions = count, "per-source questions");
    }
    Ok(())
}
