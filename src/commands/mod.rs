mod build;
mod download;
mod repair;
mod replace;
mod translate;
mod validate;

use anyhow::Result;
use clap::Subcommand;

use crate::state::PipelineConfig;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the raw source datasets that are not on disk yet
    Download,
    /// Sample, assemble and bind the untranslated corpus and queries
    Build,
    /// Translate the raw artifacts into Traditional Chinese
    Translate,
    /// Rewrite translated questions that still contain no Chinese
    Repair,
    /// Swap one question for a fresh one from the same source
    Replace {
        /// question_id to drop
        question_id: String,
    },
    /// Check the artifacts without modifying them
    Validate {
        /// Check the untranslated artifacts instead of the translated ones
        #[arg(long)]
        raw: bool,
    },
}

pub async fn run(command: Command, config: &PipelineConfig) -> Result<()> {
    match command {
        Command::Download => download::download(config).await,
        Command::Build => build::build(config),
        Command::Translate => translate::translate(config).await,
        Command::Repair => repair::repair(config).await,
        Command::Replace { question_id } => replace::replace(config, &question_id),
        Command::Validate { raw } => validate::validate(config, raw),
    }
}
