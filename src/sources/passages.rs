//! Plain background passages that only ever pad the pool.

use rand::rngs::StdRng;
use serde::Deserialize;

use super::{parse_records, Passage, SourceAdapter, Unit};
use crate::corpus::types::SourceDataset;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Record {
    Text(String),
    Object {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "content", alias = "context")]
        text: String,
    },
}

pub struct PassageAdapter {
    passages: Vec<Passage>,
}

impl PassageAdapter {
    pub fn from_records(records: Vec<serde_json::Value>) -> Self {
        let records: Vec<Record> = parse_records(SourceDataset::Negative, records);
        let passages = records
            .into_iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let (id, text) = match record {
                    Record::Text(text) => (None, text),
                    Record::Object { id, text } => (id, text),
                };
                let text = text.trim().to_string();
                (!text.is_empty()).then(|| Passage {
                    source: SourceDataset::Negative,
                    original_id: id.unwrap_or_else(|| format!("passage-{}", i)),
                    content: text,
                })
            })
            .collect();
        Self { passages }
    }
}

impl SourceAdapter for PassageAdapter {
    fn source(&self) -> SourceDataset {
        SourceDataset::Negative
    }

    fn units(&self, _rng: &mut StdRng) -> Vec<Unit> {
        Vec::new()
    }

    fn passages(&self) -> Vec<Passage> {
        self.passages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_and_objects() {
        let adapter = PassageAdapter::from_records(vec![
            json!("A bare passage."),
            json!({"id": "w-7", "text": "An object passage."}),
            json!({"content": "Aliased field."}),
            json!("   "),
        ]);
        let passages = adapter.passages();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].original_id, "passage-0");
        assert_eq!(passages[1].original_id, "w-7");
        assert_eq!(passages[2].content, "Aliased field.");
    }
}
