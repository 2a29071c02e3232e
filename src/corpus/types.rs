use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pool-unique document identifier issued by the run's registry.
pub type DocId = String;

/// Pool-unique question identifier issued by the run's registry.
pub type QuestionId = String;

/// Dataset a document or question originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceDataset {
    #[serde(rename = "drcd")]
    Drcd,
    #[serde(rename = "squad")]
    Squad,
    #[serde(rename = "hotpotqa")]
    HotpotQa,
    #[serde(rename = "2wiki")]
    TwoWiki,
    /// Background passages that only ever serve as random negatives.
    #[serde(rename = "negative")]
    Negative,
}

impl SourceDataset {
    pub const ALL: [SourceDataset; 5] = [
        SourceDataset::Drcd,
        SourceDataset::Squad,
        SourceDataset::HotpotQa,
        SourceDataset::TwoWiki,
        SourceDataset::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDataset::Drcd => "drcd",
            SourceDataset::Squad => "squad",
            SourceDataset::HotpotQa => "hotpotqa",
            SourceDataset::TwoWiki => "2wiki",
            SourceDataset::Negative => "negative",
        }
    }

    /// Question type implied by provenance. `None` for sources that never
    /// contribute questions.
    pub fn question_type(&self) -> Option<QuestionType> {
        match self {
            SourceDataset::Drcd | SourceDataset::Squad => Some(QuestionType::SingleHop),
            SourceDataset::HotpotQa | SourceDataset::TwoWiki => Some(QuestionType::MultiHop),
            SourceDataset::Negative => None,
        }
    }

    /// DRCD is already Traditional Chinese and bypasses translation.
    pub fn is_traditional_chinese(&self) -> bool {
        matches!(self, SourceDataset::Drcd)
    }
}

impl fmt::Display for SourceDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceDataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceDataset::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown source dataset: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "single-hop")]
    SingleHop,
    #[serde(rename = "multi-hop")]
    MultiHop,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleHop => f.write_str("single-hop"),
            QuestionType::MultiHop => f.write_str("multi-hop"),
        }
    }
}

/// One entry of `corpus.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    pub content: String,
    pub original_source: SourceDataset,
    /// Identifier in the originating dataset. Not unique across sources.
    pub original_id: String,
    #[serde(default)]
    pub is_gold: bool,
}

/// One entry of `queries.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: QuestionId,
    pub question: String,
    pub gold_answer: String,
    pub gold_doc_ids: Vec<DocId>,
    pub source_dataset: SourceDataset,
    pub question_type: QuestionType,
}

/// Why a document is in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocRole {
    Gold,
    HardNegative,
    RandomNegative,
}

/// Per-document provenance written to `provenance.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub doc_id: DocId,
    pub source: SourceDataset,
    pub role: DocRole,
    /// Questions citing this document as gold.
    #[serde(default)]
    pub gold_for: Vec<QuestionId>,
    /// Questions whose dataset lists this document as a distractor.
    #[serde(default)]
    pub hard_negative_for: Vec<QuestionId>,
}

/// Sidecar describing how a raw corpus/query pair was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub random_seed: u64,
    pub target_pool_size: usize,
    pub created_at: i64,
    pub documents: Vec<ProvenanceRecord>,
}

impl Provenance {
    pub fn count_role(&self, role: DocRole) -> usize {
        self.documents.iter().filter(|r| r.role == role).count()
    }
}
