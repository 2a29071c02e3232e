use anyhow::Result;
use tracing::info;

use crate::sources::download::download_all;
use crate::state::PipelineConfig;

pub async fn download(config: &PipelineConfig) -> Result<()> {
    info!(raw_dir = %config.raw_dir.display(), "Download started");
    download_all(config).await
}
