//! DRCD and SQuAD: one passage, many questions per passage.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use super::{parse_records, Candidate, DocKey, Passage, SampledDocument, SampledQuestion, SourceAdapter, Unit};
use crate::corpus::types::SourceDataset;

/// Answer lists come either columnar (Hugging Face SQuAD) or as span objects
/// (original DRCD/SQuAD JSON).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Answers {
    Columnar { text: Vec<String> },
    Spans(Vec<AnswerSpan>),
}

impl Default for Answers {
    fn default() -> Self {
        Answers::Spans(Vec::new())
    }
}

impl Answers {
    fn first_text(&self) -> Option<&str> {
        let first = match self {
            Answers::Columnar { text } => text.first().map(String::as_str),
            Answers::Spans(spans) => spans.first().map(|s| s.text.as_str()),
        };
        first.map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AnswerSpan {
    text: String,
}

/// Flat row: one question with its context inline.
#[derive(Debug, Clone, Deserialize)]
struct FlatRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answers: Answers,
}

#[derive(Debug, Clone, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Deserialize)]
struct Paragraph {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    qas: Vec<NestedQa>,
}

#[derive(Debug, Clone, Deserialize)]
struct NestedQa {
    #[serde(default)]
    id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answers: Answers,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Record {
    Article(Article),
    Flat(FlatRow),
}

#[derive(Debug, Clone)]
struct QaPair {
    id: String,
    question: String,
    answer: Option<String>,
}

/// All questions that share one context passage.
#[derive(Debug, Clone)]
struct ContextGroup {
    passage_id: String,
    context: String,
    qas: Vec<QaPair>,
}

pub struct SingleHopAdapter {
    source: SourceDataset,
    groups: Vec<ContextGroup>,
}

impl SingleHopAdapter {
    pub fn from_records(source: SourceDataset, records: Vec<serde_json::Value>) -> Self {
        let records: Vec<Record> = parse_records(source, records);
        let mut groups: Vec<ContextGroup> = Vec::new();
        let mut by_context: HashMap<String, usize> = HashMap::new();

        let mut add = |context: &str, fallback_id: String, qa: Option<QaPair>| {
            let context = context.trim();
            let idx = *by_context.entry(context.to_string()).or_insert_with(|| {
                groups.push(ContextGroup {
                    passage_id: fallback_id,
                    context: context.to_string(),
                    qas: Vec::new(),
                });
                groups.len() - 1
            });
            if let Some(qa) = qa {
                groups[idx].qas.push(qa);
            }
        };

        for (ri, record) in records.into_iter().enumerate() {
            match record {
                Record::Flat(row) => {
                    let id = non_empty_or(row.id, || format!("{}#{}", row.title, ri));
                    let qa = QaPair {
                        id: id.clone(),
                        question: row.question.trim().to_string(),
                        answer: row.answers.first_text().map(str::to_string),
                    };
                    add(&row.context, id, Some(qa));
                }
                Record::Article(article) => {
                    for (pi, para) in article.paragraphs.into_iter().enumerate() {
                        let passage_id = para
                            .id
                            .clone()
                            .filter(|s| !s.is_empty())
                            .unwrap_or_else(|| format!("{}#{}#{}", article.title, ri, pi));
                        if para.qas.is_empty() {
                            add(&para.context, passage_id.clone(), None);
                        }
                        for (qi, qa) in para.qas.into_iter().enumerate() {
                            let id = non_empty_or(qa.id, || format!("{}#q{}", passage_id, qi));
                            let pair = QaPair {
                                id,
                                question: qa.question.trim().to_string(),
                                answer: qa.answers.first_text().map(str::to_string),
                            };
                            add(&para.context, passage_id.clone(), Some(pair));
                        }
                    }
                }
            }
        }

        Self { source, groups }
    }
}

fn non_empty_or(s: String, fallback: impl FnOnce() -> String) -> String {
    if s.trim().is_empty() {
        fallback()
    } else {
        s
    }
}

impl SourceAdapter for SingleHopAdapter {
    fn source(&self) -> SourceDataset {
        self.source
    }

    /// One unit per distinct context; a context contributes at most one question.
    fn units(&self, rng: &mut StdRng) -> Vec<Unit> {
        self.groups
            .iter()
            .map(|group| {
                if group.context.is_empty() {
                    return Unit::Ineligible {
                        original_id: group.passage_id.clone(),
                        reason: "empty context",
                    };
                }
                let answerable: Vec<&QaPair> = group
                    .qas
                    .iter()
                    .filter(|qa| !qa.question.is_empty() && qa.answer.is_some())
                    .collect();
                let Some(qa) = answerable.choose(rng) else {
                    return Unit::Ineligible {
                        original_id: group.passage_id.clone(),
                        reason: "no answerable question",
                    };
                };
                // The gold passage is named after the question it was drawn for.
                let key = DocKey::new(self.source, qa.id.clone());
                Unit::Eligible(Candidate {
                    question: SampledQuestion {
                        source: self.source,
                        original_id: qa.id.clone(),
                        question: qa.question.clone(),
                        answer: qa.answer.clone().unwrap_or_default(),
                        gold: vec![key.clone()],
                        hard_negatives: Vec::new(),
                    },
                    documents: vec![SampledDocument {
                        key,
                        content: group.context.clone(),
                    }],
                })
            })
            .collect()
    }

    fn passages(&self) -> Vec<Passage> {
        self.groups
            .iter()
            .filter(|g| !g.context.is_empty())
            .map(|g| Passage {
                source: self.source,
                original_id: g.passage_id.clone(),
                content: g.context.clone(),
            })
            .collect()
    }
}
