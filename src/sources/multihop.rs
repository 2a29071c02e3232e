//! HotpotQA and 2WikiMultiHopQA: each record ships its own gold paragraphs
//! plus the dataset's labeled distractors.

use std::collections::HashSet;

use rand::rngs::StdRng;
use serde::Deserialize;

use super::{parse_records, Candidate, DocKey, Passage, SampledDocument, SampledQuestion, SourceAdapter, Unit};
use crate::corpus::types::SourceDataset;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ContextField {
    Columnar {
        title: Vec<String>,
        sentences: Vec<Vec<String>>,
    },
    Pairs(Vec<(String, Vec<String>)>),
}

impl Default for ContextField {
    fn default() -> Self {
        ContextField::Pairs(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SupportingFacts {
    Columnar { title: Vec<String> },
    Pairs(Vec<(String, serde_json::Value)>),
}

impl Default for SupportingFacts {
    fn default() -> Self {
        SupportingFacts::Pairs(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Record {
    #[serde(default, alias = "_id")]
    id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    supporting_facts: SupportingFacts,
    #[serde(default)]
    context: ContextField,
}

impl Record {
    /// `(title, text)` for every paragraph, sentences joined with single
    /// spaces. Repeated titles keep their first paragraph.
    fn paragraphs(&self) -> Vec<(String, String)> {
        let pairs: Vec<(&String, &Vec<String>)> = match &self.context {
            ContextField::Columnar { title, sentences } => title.iter().zip(sentences).collect(),
            ContextField::Pairs(pairs) => pairs.iter().map(|(t, s)| (t, s)).collect(),
        };
        let mut seen = HashSet::new();
        pairs
            .into_iter()
            .filter(|(title, _)| seen.insert(title.as_str()))
            .map(|(title, sentences)| {
                let text = sentences
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                (title.clone(), text)
            })
            .collect()
    }

    /// Distinct supporting titles in first-seen order.
    fn gold_titles(&self) -> Vec<String> {
        let titles: Vec<&String> = match &self.supporting_facts {
            SupportingFacts::Columnar { title } => title.iter().collect(),
            SupportingFacts::Pairs(pairs) => pairs.iter().map(|(t, _)| t).collect(),
        };
        let mut seen = HashSet::new();
        titles
            .into_iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

pub struct MultiHopAdapter {
    source: SourceDataset,
    records: Vec<Record>,
}

impl MultiHopAdapter {
    pub fn from_records(source: SourceDataset, records: Vec<serde_json::Value>) -> Self {
        let records: Vec<Record> = parse_records(source, records)
            .into_iter()
            .filter(|r: &Record| !r.id.is_empty())
            .collect();
        Self { source, records }
    }

    fn doc_key(&self, record: &Record, title: &str) -> DocKey {
        DocKey::new(self.source, format!("{}_{}", record.id, title))
    }

    fn unit(&self, record: &Record) -> Unit {
        let ineligible = |reason| Unit::Ineligible {
            original_id: record.id.clone(),
            reason,
        };
        if record.question.trim().is_empty() || record.answer.trim().is_empty() {
            return ineligible("missing question or answer");
        }
        let gold_titles = record.gold_titles();
        if gold_titles.is_empty() {
            return ineligible("no supporting facts");
        }

        let paragraphs = record.paragraphs();
        let mut documents = Vec::new();
        let mut gold = Vec::new();
        for title in &gold_titles {
            match paragraphs.iter().find(|(t, text)| t == title && !text.is_empty()) {
                Some((_, text)) => {
                    let key = self.doc_key(record, title);
                    gold.push(key.clone());
                    documents.push(SampledDocument {
                        key,
                        content: text.clone(),
                    });
                }
                None => return ineligible("gold paragraph missing or empty"),
            }
        }

        let mut hard_negatives = Vec::new();
        for (title, text) in &paragraphs {
            if text.is_empty() || gold_titles.contains(title) {
                continue;
            }
            let key = self.doc_key(record, title);
            hard_negatives.push(key.clone());
            documents.push(SampledDocument {
                key,
                content: text.clone(),
            });
        }

        Unit::Eligible(Candidate {
            question: SampledQuestion {
                source: self.source,
                original_id: record.id.clone(),
                question: record.question.trim().to_string(),
                answer: record.answer.trim().to_string(),
                gold,
                hard_negatives,
            },
            documents,
        })
    }
}

impl SourceAdapter for MultiHopAdapter {
    fn source(&self) -> SourceDataset {
        self.source
    }

    fn units(&self, _rng: &mut StdRng) -> Vec<Unit> {
        self.records.iter().map(|r| self.unit(r)).collect()
    }

    fn passages(&self) -> Vec<Passage> {
        self.records
            .iter()
            .flat_map(|record| {
                record
                    .paragraphs()
                    .into_iter()
                    .filter(|(_, text)| !text.is_empty())
                    .map(move |(title, text)| Passage {
                        source: self.source,
                        original_id: format!("{}_{}", record.id, title),
                        content: text,
                    })
            })
            .collect()
    }
}
