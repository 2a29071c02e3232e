use thiserror::Error;

use crate::corpus::types::{QuestionType, SourceDataset};

/// Invariant violations raised by the Extract/Assemble/Bind/Validate stages
/// and by the translation relay protocol.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("identifier {id} was already issued in this run")]
    DuplicateIdentifier { id: String },

    #[error("{dataset} cannot fill its quota: requested {requested}, eligible {eligible}, excluded in draw window {excluded} (short by {shortfall})")]
    InsufficientData {
        dataset: SourceDataset,
        requested: usize,
        /// Eligible units in the whole source.
        eligible: usize,
        /// Ineligible units met while drawing.
        excluded: usize,
        shortfall: usize,
    },

    #[error("merged gold + hard-negative documents ({merged}) exceed target pool size {target}")]
    PoolOverflow { merged: usize, target: usize },

    #[error("not enough random-negative candidates: needed {needed}, available {available}")]
    InsufficientPadding { needed: usize, available: usize },

    #[error("translation batch {batch} came back without {} requested id(s): {}", .missing.len(), .missing.join(", "))]
    TranslationBatchMismatch { batch: String, missing: Vec<String> },

    #[error("question {question_id} references missing document {doc_id}")]
    DanglingReference { question_id: String, doc_id: String },

    #[error("corpus holds {actual} documents, expected {expected}")]
    PoolSizeMismatch { expected: usize, actual: usize },

    #[error("query set holds {actual} questions, expected {expected}")]
    QuestionCountMismatch { expected: usize, actual: usize },

    #[error("{dataset} contributes {actual} questions, quota is {expected}")]
    QuotaMismatch {
        dataset: SourceDataset,
        expected: usize,
        actual: usize,
    },

    #[error("question {question_id} has no gold documents")]
    EmptyGoldSet { question_id: String },

    #[error("question {question_id} from {dataset} is typed {actual}, expected {expected}")]
    QuestionTypeMismatch {
        question_id: String,
        dataset: SourceDataset,
        expected: QuestionType,
        actual: QuestionType,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DuplicateIdentifier { .. } => "duplicate_identifier",
            PipelineError::InsufficientData { .. } => "insufficient_data",
            PipelineError::PoolOverflow { .. } => "pool_overflow",
            PipelineError::InsufficientPadding { .. } => "insufficient_padding",
            PipelineError::TranslationBatchMismatch { .. } => "translation_batch_mismatch",
            PipelineError::DanglingReference { .. } => "dangling_reference",
            PipelineError::PoolSizeMismatch { .. } => "pool_size_mismatch",
            PipelineError::QuestionCountMismatch { .. } => "question_count_mismatch",
            PipelineError::QuotaMismatch { .. } => "quota_mismatch",
            PipelineError::EmptyGoldSet { .. } => "empty_gold_set",
            PipelineError::QuestionTypeMismatch { .. } => "question_type_mismatch",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::Io(_) => "io",
            PipelineError::Serialization(_) => "serialization",
        }
    }

    /// Process exit status for this error kind. Zero is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::DuplicateIdentifier { .. } => 10,
            PipelineError::InsufficientData { .. } => 11,
            PipelineError::PoolOverflow { .. } => 12,
            PipelineError::InsufficientPadding { .. } => 13,
            PipelineError::TranslationBatchMismatch { .. } => 14,
            PipelineError::DanglingReference { .. } => 15,
            PipelineError::PoolSizeMismatch { .. } => 20,
            PipelineError::QuestionCountMismatch { .. } => 21,
            PipelineError::QuotaMismatch { .. } => 22,
            PipelineError::EmptyGoldSet { .. } => 23,
            PipelineError::QuestionTypeMismatch { .. } => 24,
            PipelineError::InvalidConfig(_) => 2,
            PipelineError::Io(_) | PipelineError::Serialization(_) => 1,
        }
    }
}
