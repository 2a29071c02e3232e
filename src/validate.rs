//! Read-only integrity checks over a corpus/query pair.
//!
//! Hard checks run in a fixed order and stop at the first violation. Soft
//! checks never fail; they are logged and collected in the report.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use crate::corpus::types::{DocRole, Provenance, SourceDataset};
use crate::corpus::{is_chinese_text, Pool};
use crate::error::PipelineError;
use crate::state::PipelineConfig;

/// How many offending IDs a language warning names before summarizing.
const SHOWN_IDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub documents: usize,
    pub questions: usize,
    pub per_source: BTreeMap<SourceDataset, usize>,
    pub gold_documents: usize,
    /// Only known when provenance is available.
    pub hard_negatives: Option<usize>,
    pub random_negatives: Option<usize>,
    pub warnings: Vec<String>,
}

/// Options for one validator run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Warn about non-DRCD text with no CJK ideographs (translated artifacts only).
    pub check_language: bool,
}

pub fn validate(
    pool: &Pool,
    provenance: Option<&Provenance>,
    config: &PipelineConfig,
    options: ValidateOptions,
) -> Result<ValidationReport, PipelineError> {
    // 1. pool size
    if pool.documents.len() != config.target_pool_size {
        return Err(PipelineError::PoolSizeMismatch {
            expected: config.target_pool_size,
            actual: pool.documents.len(),
        });
    }

    // 2. question count
    if pool.questions.len() != config.total_questions() {
        return Err(PipelineError::QuestionCountMismatch {
            expected: config.total_questions(),
            actual: pool.questions.len(),
        });
    }

    // 3. every gold reference resolves
    let doc_ids: HashSet<&str> = pool.documents.iter().map(|d| d.doc_id.as_str()).collect();
    let mut gold_ids: HashSet<&str> = HashSet::new();
    for q in &pool.questions {
        if q.gold_doc_ids.is_empty() {
            return Err(PipelineError::EmptyGoldSet {
                question_id: q.question_id.clone(),
            });
        }
        for id in &q.gold_doc_ids {
            if !doc_ids.contains(id.as_str()) {
                return Err(PipelineError::DanglingReference {
                    question_id: q.question_id.clone(),
                    doc_id: id.clone(),
                });
            }
            gold_ids.insert(id.as_str());
        }
    }

    // 4. uniqueness
    if doc_ids.len() != pool.documents.len() {
        return Err(PipelineError::DuplicateIdentifier {
            id: first_duplicate(pool.documents.iter().map(|d| d.doc_id.as_str())),
        });
    }
    let question_ids: HashSet<&str> = pool.questions.iter().map(|q| q.question_id.as_str()).collect();
    if question_ids.len() != pool.questions.len() || !question_ids.is_disjoint(&doc_ids) {
        return Err(PipelineError::DuplicateIdentifier {
            id: first_duplicate(
                pool.documents
                    .iter()
                    .map(|d| d.doc_id.as_str())
                    .chain(pool.questions.iter().map(|q| q.question_id.as_str())),
            ),
        });
    }

    // 5. question type follows provenance
    for q in &pool.questions {
        let expected = q.source_dataset.question_type();
        if expected != Some(q.question_type) {
            return Err(PipelineError::QuestionTypeMismatch {
                question_id: q.question_id.clone(),
                dataset: q.source_dataset,
                expected: expected.ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "question {} claims non-question source {}",
                        q.question_id, q.source_dataset
                    ))
                })?,
                actual: q.question_type,
            });
        }
    }

    // 5b. per-source quotas
    let mut per_source: BTreeMap<SourceDataset, usize> = BTreeMap::new();
    for q in &pool.questions {
        *per_source.entry(q.source_dataset).or_default() += 1;
    }
    for source in config.per_source_quota.keys().chain(per_source.keys()) {
        let expected = config.quota(*source);
        let actual = per_source.get(source).copied().unwrap_or(0);
        if expected != actual {
            return Err(PipelineError::QuotaMismatch {
                dataset: *source,
                expected,
                actual,
            });
        }
    }

    let mut report = ValidationReport {
        documents: pool.documents.len(),
        questions: pool.questions.len(),
        per_source,
        gold_documents: gold_ids.len(),
        hard_negatives: None,
        random_negatives: None,
        warnings: Vec::new(),
    };
    soft_checks(pool, provenance, config, options, &gold_ids, &mut report);

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    info!(
        documents = report.documents,
        questions = report.questions,
        gold = report.gold_documents,
        hard_negatives = ?report.hard_negatives,
        random_negatives = ?report.random_negatives,
        warnings = report.warnings.len(),
        "validation passed"
    );
    Ok(report)
}

fn first_duplicate<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return id.to_string();
        }
    }
    String::new()
}

fn soft_checks(
    pool: &Pool,
    provenance: Option<&Provenance>,
    config: &PipelineConfig,
    options: ValidateOptions,
    gold_ids: &HashSet<&str>,
    report: &mut ValidationReport,
) {
    let warnings = &mut report.warnings;

    if !config.gold_count_range.contains(report.gold_documents) {
        warnings.push(format!(
            "gold document count {} outside [{}, {}]",
            report.gold_documents, config.gold_count_range.min, config.gold_count_range.max
        ));
    }

    let flagged = pool.documents.iter().filter(|d| d.is_gold).count();
    if flagged != report.gold_documents {
        warnings.push(format!(
            "{} documents flagged is_gold but {} are referenced as gold",
            flagged, report.gold_documents
        ));
    }

    match provenance {
        Some(provenance) => {
            let hard = provenance.count_role(DocRole::HardNegative);
            let random = provenance.count_role(DocRole::RandomNegative);
            if !config.hard_negative_range.contains(hard) {
                warnings.push(format!(
                    "hard negative count {} outside [{}, {}]",
                    hard, config.hard_negative_range.min, config.hard_negative_range.max
                ));
            }
            let recorded: HashSet<&str> =
                provenance.documents.iter().map(|r| r.doc_id.as_str()).collect();
            let pooled: HashSet<&str> = pool.documents.iter().map(|d| d.doc_id.as_str()).collect();
            if recorded != pooled {
                warnings.push("provenance does not describe the same documents as the corpus".to_string());
            }
            let recorded_gold = provenance.count_role(DocRole::Gold);
            if recorded_gold != gold_ids.len() {
                warnings.push(format!(
                    "provenance lists {} gold documents, queries reference {}",
                    recorded_gold,
                    gold_ids.len()
                ));
            }
            report.hard_negatives = Some(hard);
            report.random_negatives = Some(random);
        }
        None => warnings.push("no provenance available, hard/random split not checked".to_string()),
    }

    if options.check_language {
        let untranslated_questions: Vec<&str> = pool
            .questions
            .iter()
            .filter(|q| !q.source_dataset.is_traditional_chinese() && !is_chinese_text(&q.question))
            .map(|q| q.question_id.as_str())
            .collect();
        if let Some(w) = language_warning("questions", &untranslated_questions) {
            warnings.push(w);
        }
        let untranslated_docs: Vec<&str> = pool
            .documents
            .iter()
            .filter(|d| !d.original_source.is_traditional_chinese() && !is_chinese_text(&d.content))
            .map(|d| d.doc_id.as_str())
            .collect();
        if let Some(w) = language_warning("documents", &untranslated_docs) {
            warnings.push(w);
        }
    }
}

fn language_warning(what: &str, ids: &[&str]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let shown = ids.iter().take(SHOWN_IDS).copied().collect::<Vec<_>>().join(", ");
    let more = ids.len().saturating_sub(SHOWN_IDS);
    Some(if more > 0 {
        format!("{} {} are not mostly Chinese text: {} and {} more", ids.len(), what, shown, more)
    } else {
        format!("{} {} are not mostly Chinese text: {}", ids.len(), what, shown)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::types::{Document, ProvenanceRecord, Question, QuestionType};
    use crate::state::CountRange;

    fn doc(id: &str, source: SourceDataset, gold: bool) -> Document {
        Document {
            doc_id: id.to_string(),
            content: format!("content of {}", id),
            original_source: source,
            original_id: id.to_string(),
            is_gold: gold,
        }
    }

    fn question(id: &str, source: SourceDataset, gold: &[&str]) -> Question {
        Question {
            question_id: id.to_string(),
            question: format!("{}?", id),
            gold_answer: "a".to_string(),
            gold_doc_ids: gold.iter().map(|s| s.to_string()).collect(),
            source_dataset: source,
            question_type: source.question_type().unwrap(),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            per_source_quota: BTreeMap::from([(SourceDataset::Squad, 1), (SourceDataset::HotpotQa, 1)]),
            target_pool_size: 5,
            gold_count_range: CountRange::new(1, 3),
            hard_negative_range: CountRange::new(0, 2),
            ..PipelineConfig::default()
        }
    }

    fn pool() -> Pool {
        Pool::new(
            vec![
                doc("d1", SourceDataset::Squad, true),
                doc("d2", SourceDataset::HotpotQa, true),
                doc("d3", SourceDataset::HotpotQa, true),
                doc("d4", SourceDataset::HotpotQa, false),
                doc("d5", SourceDataset::Squad, false),
            ],
            vec![
                question("q1", SourceDataset::Squad, &["d1"]),
                question("q2", SourceDataset::HotpotQa, &["d2", "d3"]),
            ],
        )
    }

    fn provenance() -> Provenance {
        let role = |id: &str| match id {
            "d4" => DocRole::HardNegative,
            "d5" => DocRole::RandomNegative,
            _ => DocRole::Gold,
        };
        Provenance {
            random_seed: 11,
            target_pool_size: 5,
            created_at: 0,
            documents: pool()
                .documents
                .iter()
                .map(|d| ProvenanceRecord {
                    doc_id: d.doc_id.clone(),
                    source: d.original_source,
                    role: role(&d.doc_id),
                    gold_for: vec![],
                    hard_negative_for: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_pool_passes_without_warnings() {
        let report = validate(&pool(), Some(&provenance()), &config(), ValidateOptions::default()).unwrap();
        assert_eq!(report.documents, 5);
        assert_eq!(report.gold_documents, 3);
        assert_eq!(report.hard_negatives, Some(1));
        assert_eq!(report.random_negatives, Some(1));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let pool = pool();
        let before = pool.clone();
        let options = ValidateOptions { check_language: true };
        let a = validate(&pool, None, &config(), options).unwrap();
        let b = validate(&pool, None, &config(), options).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool, before);
    }

    #[test]
    fn test_checks_fail_in_order() {
        let mut bad = pool();
        bad.documents.pop();
        bad.questions[0].gold_doc_ids = vec!["missing".to_string()];
        // Count mismatch is reported before the dangling reference.
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::PoolSizeMismatch { expected: 5, actual: 4 }));

        let mut bad = pool();
        bad.questions[0].gold_doc_ids = vec!["missing".to_string()];
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DanglingReference { .. }));
    }

    #[test]
    fn test_duplicate_and_type_violations() {
        let mut bad = pool();
        bad.documents[4].doc_id = "d1".to_string();
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateIdentifier { ref id } if id == "d1"));

        let mut bad = pool();
        bad.questions[1].question_type = QuestionType::SingleHop;
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::QuestionTypeMismatch { .. }));

        let mut bad = pool();
        bad.questions[0].gold_doc_ids.clear();
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyGoldSet { .. }));
    }

    #[test]
    fn test_per_source_quota_is_enforced() {
        let mut bad = pool();
        bad.questions[0] = question("q1", SourceDataset::Drcd, &["d1"]);
        let err = validate(&bad, None, &config(), ValidateOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::QuotaMismatch { dataset: SourceDataset::Squad, expected: 1, actual: 0 }
        ));
    }

    #[test]
    fn test_soft_checks_only_warn() {
        let mut config = config();
        config.gold_count_range = CountRange::new(10, 20);
        let report = validate(
            &pool(),
            Some(&provenance()),
            &config,
            ValidateOptions { check_language: true },
        )
        .unwrap();
        assert!(report.warnings.iter().any(|w| w.starts_with("gold document count 3")));
        assert!(report.warnings.iter().any(|w| w.contains("2 questions are not mostly Chinese")));
    }

    #[test]
    fn test_embedded_native_name_is_still_flagged() {
        let mut translated = pool();
        for q in translated.questions.iter_mut() {
            q.question = "這是誰？".to_string();
        }
        for d in translated.documents.iter_mut() {
            d.content = "這是翻譯後的段落。".to_string();
        }
        translated.documents[0].content =
            "Beijing (北京) is the capital of the People's Republic of China.".to_string();

        let report = validate(
            &translated,
            Some(&provenance()),
            &config(),
            ValidateOptions { check_language: true },
        )
        .unwrap();
        assert_eq!(
            report.warnings,
            vec!["1 documents are not mostly Chinese text: d1".to_string()]
        );
    }
}
