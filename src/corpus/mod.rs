pub mod registry;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use types::{Document, Provenance, Question};

const CORPUS_RAW: &str = "corpus_raw.json";
const QUERIES_RAW: &str = "queries_raw.json";
const PROVENANCE: &str = "provenance.json";
const CORPUS: &str = "corpus.json";
const QUERIES: &str = "queries.json";

/// Content fingerprint used for passage-level dedup (blake3 hex).
pub fn fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// True if CJK ideographs make up at least half of the letters in `text`.
/// A passage that only quotes a native name does not qualify.
pub fn is_chinese_text(text: &str) -> bool {
    let (cjk, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(cjk, letters), c| {
            (cjk + usize::from(is_cjk(c)), letters + 1)
        });
    letters > 0 && cjk * 2 >= letters
}

/// All documents and questions produced by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pool {
    pub documents: Vec<Document>,
    pub questions: Vec<Question>,
}

impl Pool {
    pub fn new(documents: Vec<Document>, questions: Vec<Question>) -> Self {
        Self {
            documents,
            questions,
        }
    }

    pub fn document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.doc_id == doc_id)
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }
}

/// Locations of every artifact inside the output directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
    pub fn corpus_raw(&self) -> PathBuf {
        self.dir.join(CORPUS_RAW)
    }
    pub fn queries_raw(&self) -> PathBuf {
        self.dir.join(QUERIES_RAW)
    }
    pub fn provenance(&self) -> PathBuf {
        self.dir.join(PROVENANCE)
    }
    pub fn corpus(&self) -> PathBuf {
        self.dir.join(CORPUS)
    }
    pub fn queries(&self) -> PathBuf {
        self.dir.join(QUERIES)
    }

    pub fn load_raw(&self) -> Result<Pool> {
        Ok(Pool::new(
            read_json(&self.corpus_raw())?,
            read_json(&self.queries_raw())?,
        ))
    }

    pub fn load_translated(&self) -> Result<Pool> {
        Ok(Pool::new(
            read_json(&self.corpus())?,
            read_json(&self.queries())?,
        ))
    }

    pub fn load_provenance(&self) -> Result<Option<Provenance>> {
        let path = self.provenance();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Persist the untranslated pool and its provenance together.
    pub fn save_raw(&self, pool: &Pool, provenance: &Provenance) -> Result<()> {
        write_all_atomic(&[
            (self.corpus_raw(), to_json_bytes(&pool.documents)?),
            (self.queries_raw(), to_json_bytes(&pool.questions)?),
            (self.provenance(), to_json_bytes(provenance)?),
        ])
    }

    pub fn save_translated(&self, pool: &Pool) -> Result<()> {
        write_all_atomic(&[
            (self.corpus(), to_json_bytes(&pool.documents)?),
            (self.queries(), to_json_bytes(&pool.questions)?),
        ])
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).context("serialize artifact")
}

/// Write every file to a temporary sibling first, then rename them all into
/// place. A failure before the renames leaves existing artifacts untouched.
pub fn write_all_atomic(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        staged.push((tmp, path));
    }
    for (tmp, path) in staged {
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        debug!(path = %path.display(), "artifact written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::types::{QuestionType, SourceDataset};

    fn sample_pool() -> Pool {
        Pool::new(
            vec![Document {
                doc_id: "doc_a".to_string(),
                content: "台北是首都".to_string(),
                original_source: SourceDataset::Drcd,
                original_id: "1-1".to_string(),
                is_gold: true,
            }],
            vec![Question {
                question_id: "q_a".to_string(),
                question: "首都在哪？".to_string(),
                gold_answer: "台北".to_string(),
                gold_doc_ids: vec!["doc_a".to_string()],
                source_dataset: SourceDataset::Drcd,
                question_type: QuestionType::SingleHop,
            }],
        )
    }

    #[test]
    fn test_chinese_text_needs_a_cjk_majority() {
        assert!(is_chinese_text("Paris 是法國首都"));
        assert!(is_chinese_text("台北是首都。"));
        assert!(!is_chinese_text("Paris is the capital"));
        assert!(!is_chinese_text(
            "Beijing (北京) is the capital of the People's Republic of China."
        ));
        assert!(!is_chinese_text(""));
        assert!(!is_chinese_text("1999"));
    }

    #[test]
    fn test_fingerprint_is_content_addressed() {
        assert_eq!(fingerprint("same"), fingerprint("same"));
        assert_ne!(fingerprint("same"), fingerprint("same "));
    }

    #[test]
    fn test_save_and_load_raw() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("out"));
        let pool = sample_pool();
        let provenance = Provenance {
            random_seed: 11,
            target_pool_size: 1,
            created_at: 0,
            documents: vec![],
        };
        paths.save_raw(&pool, &provenance).unwrap();

        assert_eq!(paths.load_raw().unwrap(), pool);
        assert_eq!(paths.load_provenance().unwrap(), Some(provenance));
        assert!(!paths.corpus_raw().with_extension("json.tmp").exists());

        // Non-ASCII text is kept readable in the artifact.
        let text = std::fs::read_to_string(paths.corpus_raw()).unwrap();
        assert!(text.contains("台北是首都"));
    }

    #[test]
    fn test_missing_provenance_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        assert!(paths.load_provenance().unwrap().is_none());
    }
}
