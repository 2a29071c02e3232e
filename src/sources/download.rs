use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::corpus::{to_json_bytes, write_all_atomic};
use crate::llm::with_retries;
use crate::state::{DatasetLocator, PipelineConfig};

const ROWS_ENDPOINT: &str = "https://datasets-server.huggingface.co/rows";
/// Largest page the rows API serves.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct RowsPage {
    rows: Vec<RowEntry>,
    num_rows_total: usize,
}

#[derive(Debug, Deserialize)]
struct RowEntry {
    row: serde_json::Value,
}

fn rows_url(locator: &DatasetLocator, offset: usize, length: usize) -> String {
    format!(
        "{}?dataset={}&config={}&split={}&offset={}&length={}",
        ROWS_ENDPOINT, locator.dataset, locator.config, locator.split, offset, length
    )
}

/// Fetch every configured raw dataset that is not on disk yet.
pub async fn download_all(config: &PipelineConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .context("Failed to create HTTP client")?;

    let mut wanted: Vec<_> = config.per_source_quota.keys().copied().collect();
    wanted.extend(config.negative_sources.iter().copied());
    wanted.sort();
    wanted.dedup();

    for source in wanted {
        let dest = config.raw_path(source);
        if dest.exists() {
            info!(%source, path = %dest.display(), "raw dataset already present, skipping");
            continue;
        }
        let Some(locator) = config.datasets.get(&source) else {
            warn!(%source, "no download location configured");
            continue;
        };
        let rows =
            download_dataset(&client, locator, &dest, config.download_max_rows, config.max_retries)
                .await
                .with_context(|| format!("Failed to download {}", source))?;
        info!(%source, rows, path = %dest.display(), "raw dataset saved");
    }
    Ok(())
}

/// Page through the rows API and store the rows as one JSON array.
pub async fn download_dataset(
    client: &reqwest::Client,
    locator: &DatasetLocator,
    dest: &Path,
    max_rows: Option<usize>,
    max_retries: u32,
) -> Result<usize> {
    let mut rows: Vec<serde_json::Value> = Vec::new();
    let mut total = None;

    loop {
        let limit = max_rows.unwrap_or(usize::MAX).min(total.unwrap_or(usize::MAX));
        if rows.len() >= limit {
            break;
        }
        let length = PAGE_SIZE.min(limit - rows.len());
        let url = rows_url(locator, rows.len(), length);
        let url = url.as_str();

        let page: RowsPage = with_retries(max_retries, move || async move {
            let resp = client
                .get(url)
                .send()
                .await
                .context("rows request failed")?
                .error_for_status()
                .context("rows request rejected")?;
            resp.json::<RowsPage>().await.context("Failed to parse rows page")
        })
        .await?;

        total = Some(page.num_rows_total);
        if page.rows.is_empty() {
            break;
        }
        rows.extend(page.rows.into_iter().map(|e| e.row));
        info!(dataset = %locator.dataset, fetched = rows.len(), total = page.num_rows_total, "rows page");
    }

    write_all_atomic(&[(dest.to_path_buf(), to_json_bytes(&rows)?)])?;
    Ok(rows.len())
}
