use anyhow::Result;
use tracing::info;

use crate::corpus::ArtifactPaths;
use crate::state::PipelineConfig;
use crate::validate::{validate as check, ValidateOptions};

pub fn validate(config: &PipelineConfig, raw: bool) -> Result<()> {
    let paths = ArtifactPaths::new(&config.output_dir);
    let pool = if raw {
        paths.load_raw()?
    } else {
        paths.load_translated()?
    };
    let provenance = paths.load_provenance()?;

    let report = check(
        &pool,
        provenance.as_ref(),
        config,
        ValidateOptions {
            check_language: !raw,
        },
    )?;
    for (source, count) in &report.per_source {
        info!(%source, questions = count, "per-source questions");
    }
    info!(warnings = report.warnings.len(), "Validation finished");
    Ok(())
}
