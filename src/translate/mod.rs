//! Translation of pool text into Traditional Chinese without touching IDs.
//!
//! Every translatable text is a slot addressed as `{owner_id}#{field}`.
//! Slots are grouped by cross-reference cluster (a question plus every
//! document it links to) so a cluster shares one glossary, sent to the relay
//! in bounded concurrent batches, and written back by ID.

pub mod checkpoint;
pub mod glossary;
pub mod prompts;
pub mod relay;
pub mod repair;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::corpus::types::{Provenance, SourceDataset};
use crate::corpus::{is_chinese_text, Pool};
use crate::error::PipelineError;

use checkpoint::Checkpoint;
use relay::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotField {
    Question,
    GoldAnswer,
    Content,
}

impl SlotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotField::Question => "question",
            SlotField::GoldAnswer => "gold_answer",
            SlotField::Content => "content",
        }
    }
}

impl fmt::Display for SlotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn slot_id(owner: &str, field: SlotField) -> String {
    format!("{}#{}", owner, field)
}

/// One `(id, text)` pair exchanged with the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationBatch {
    pub label: String,
    pub glossary: Vec<String>,
    pub items: Vec<TranslationItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Re-submissions of missing IDs before a batch is rejected.
    pub max_batch_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateStats {
    pub slots: usize,
    pub reused: usize,
    pub translated: usize,
    pub batches: usize,
}

/// Text already in Traditional Chinese, blank text, and all DRCD material
/// pass through unchanged.
pub fn needs_translation(source: SourceDataset, text: &str) -> bool {
    !source.is_traditional_chinese() && !text.trim().is_empty() && !is_chinese_text(text)
}

/// Translatable slots keyed by owner ID, in pool order.
fn owner_slots(pool: &Pool) -> HashMap<&str, Vec<TranslationItem>> {
    let mut out: HashMap<&str, Vec<TranslationItem>> = HashMap::new();
    for q in &pool.questions {
        for (field, text) in [
            (SlotField::Question, &q.question),
            (SlotField::GoldAnswer, &q.gold_answer),
        ] {
            if needs_translation(q.source_dataset, text) {
                out.entry(q.question_id.as_str()).or_default().push(TranslationItem {
                    id: slot_id(&q.question_id, field),
                    text: text.clone(),
                });
            }
        }
    }
    for d in &pool.documents {
        if needs_translation(d.original_source, &d.content) {
            out.entry(d.doc_id.as_str()).or_default().push(TranslationItem {
                id: slot_id(&d.doc_id, SlotField::Content),
                text: d.content.clone(),
            });
        }
    }
    out
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the smaller index as root so cluster order follows pool order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Owner IDs grouped into cross-reference clusters. Questions come first in
/// pool order, followed by documents no question links to.
pub fn build_clusters<'a>(pool: &'a Pool, provenance: Option<&Provenance>) -> Vec<Vec<&'a str>> {
    let owners: Vec<&str> = pool
        .questions
        .iter()
        .map(|q| q.question_id.as_str())
        .chain(pool.documents.iter().map(|d| d.doc_id.as_str()))
        .collect();
    let index: HashMap<&str, usize> = owners.iter().enumerate().map(|(i, o)| (*o, i)).collect();
    let mut sets = DisjointSet::new(owners.len());

    for (qi, q) in pool.questions.iter().enumerate() {
        for doc_id in &q.gold_doc_ids {
            if let Some(&di) = index.get(doc_id.as_str()) {
                sets.union(qi, di);
            }
        }
    }
    if let Some(provenance) = provenance {
        for record in &provenance.documents {
            let Some(&di) = index.get(record.doc_id.as_str()) else {
                continue;
            };
            for qid in &record.hard_negative_for {
                if let Some(&qi) = index.get(qid.as_str()) {
                    sets.union(qi, di);
                }
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (i, owner) in owners.iter().enumerate() {
        clusters.entry(sets.find(i)).or_default().push(owner);
    }
    clusters.into_values().collect()
}

/// Split pending slots into batches. Batches never span clusters, and every
/// batch of a cluster carries the glossary built from the whole cluster.
pub fn plan_batches(
    pool: &Pool,
    provenance: Option<&Provenance>,
    batch_size: usize,
    done: &HashSet<String>,
) -> Vec<TranslationBatch> {
    let slots = owner_slots(pool);
    let mut batches = Vec::new();

    for (ci, cluster) in build_clusters(pool, provenance).into_iter().enumerate() {
        let cluster_slots: Vec<&TranslationItem> = cluster
            .iter()
            .filter_map(|owner| slots.get(owner))
            .flatten()
            .collect();
        let pending: Vec<TranslationItem> = cluster_slots
            .iter()
            .filter(|s| !done.contains(&s.id))
            .map(|s| (*s).clone())
            .collect();
        if pending.is_empty() {
            continue;
        }
        let glossary = glossary::extract_terms(cluster_slots.iter().map(|s| s.text.as_str()));
        for (bi, chunk) in pending.chunks(batch_size.max(1)).enumerate() {
            batches.push(TranslationBatch {
                label: format!("cluster-{}/{}", ci, bi),
                glossary: glossary.clone(),
                items: chunk.to_vec(),
            });
        }
    }
    batches
}

/// Send one batch, re-submitting only the IDs the relay left out. IDs the
/// relay invents are ignored.
pub async fn translate_checked<T: Translator>(
    translator: &T,
    batch: &TranslationBatch,
    max_batch_retries: u32,
) -> Result<Vec<TranslationItem>> {
    let mut accepted: HashMap<String, String> = HashMap::new();
    let mut pending = batch.clone();

    for round in 0..=max_batch_retries {
        let reply = translator.translate_batch(&pending).await?;
        let requested: HashSet<&str> = pending.items.iter().map(|i| i.id.as_str()).collect();
        for item in reply {
            if requested.contains(item.id.as_str()) && !item.text.trim().is_empty() {
                accepted.entry(item.id).or_insert(item.text);
            }
        }
        pending.items.retain(|i| !accepted.contains_key(&i.id));
        if pending.items.is_empty() {
            break;
        }
        warn!(
            batch = %batch.label,
            round,
            missing = pending.items.len(),
            "relay reply is missing ids"
        );
    }

    if !pending.items.is_empty() {
        return Err(PipelineError::TranslationBatchMismatch {
            batch: batch.label.clone(),
            missing: pending.items.into_iter().map(|i| i.id).collect(),
        }
        .into());
    }

    Ok(batch
        .items
        .iter()
        .filter_map(|i| {
            accepted.remove(&i.id).map(|text| TranslationItem {
                id: i.id.clone(),
                text,
            })
        })
        .collect())
}

/// Run every batch through the relay with at most `concurrency` in flight.
/// Finished batches are committed to the checkpoint as they arrive, so an
/// interrupted run keeps its progress.
pub async fn relay_batches<T: Translator>(
    translator: &T,
    batches: Vec<TranslationBatch>,
    options: RelayOptions,
    checkpoint: Option<&Checkpoint>,
) -> Result<HashMap<String, String>> {
    let total = batches.len();
    let mut results = stream::iter(batches)
        .map(move |batch| async move {
            let items = translate_checked(translator, &batch, options.max_batch_retries).await;
            (batch, items)
        })
        .buffer_unordered(options.concurrency.max(1));

    let mut translations = HashMap::new();
    let mut finished = 0usize;
    while let Some((batch, items)) = results.next().await {
        let items = items?;
        if let Some(checkpoint) = checkpoint {
            let sources: HashMap<&str, &str> = batch
                .items
                .iter()
                .map(|i| (i.id.as_str(), i.text.as_str()))
                .collect();
            let entries: Vec<(&str, &str, &str)> = items
                .iter()
                .filter_map(|i| {
                    sources
                        .get(i.id.as_str())
                        .map(|src| (i.id.as_str(), *src, i.text.as_str()))
                })
                .collect();
            checkpoint.record(&entries).await?;
        }
        finished += 1;
        info!(batch = %batch.label, items = items.len(), finished, total, "batch accepted");
        translations.extend(items.into_iter().map(|i| (i.id, i.text)));
    }
    Ok(translations)
}

/// Write translated text back by slot ID. IDs, order and every other field
/// are carried over unchanged; slots without a translation keep their text.
pub fn apply_translations(pool: &Pool, translations: &HashMap<String, String>) -> Pool {
    let lookup = |owner: &str, field: SlotField, current: &str| -> String {
        translations
            .get(&slot_id(owner, field))
            .cloned()
            .unwrap_or_else(|| current.to_string())
    };

    let mut out = pool.clone();
    for q in out.questions.iter_mut() {
        q.question = lookup(&q.question_id, SlotField::Question, &q.question);
        q.gold_answer = lookup(&q.question_id, SlotField::GoldAnswer, &q.gold_answer);
    }
    for d in out.documents.iter_mut() {
        d.content = lookup(&d.doc_id, SlotField::Content, &d.content);
    }
    out
}

/// Translate a raw pool. Slots already in the checkpoint for the same source
/// text are reused instead of sent again.
pub async fn translate_pool<T: Translator>(
    pool: &Pool,
    provenance: Option<&Provenance>,
    translator: &T,
    options: RelayOptions,
    checkpoint: Option<&Checkpoint>,
) -> Result<(Pool, TranslateStats)> {
    let slots = owner_slots(pool);
    let mut translations: HashMap<String, String> = HashMap::new();
    let mut stats = TranslateStats::default();

    let committed = match checkpoint {
        Some(checkpoint) => checkpoint.entries().await?,
        None => HashMap::new(),
    };
    for item in slots.values().flatten() {
        stats.slots += 1;
        if let Some(entry) = committed.get(&item.id) {
            if entry.matches_source(&item.text) {
                translations.insert(item.id.clone(), entry.text.clone());
                stats.reused += 1;
            }
        }
    }

    let done: HashSet<String> = translations.keys().cloned().collect();
    let batches = plan_batches(pool, provenance, options.batch_size, &done);
    stats.batches = batches.len();
    info!(
        slots = stats.slots,
        reused = stats.reused,
        batches = stats.batches,
        concurrency = options.concurrency,
        "translation planned"
    );

    let fresh = relay_batches(translator, batches, options, checkpoint).await?;
    stats.translated = fresh.len();
    translations.extend(fresh);

    Ok((apply_translations(pool, &translations), stats))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;

    /// Relay double: prefixes text with a marker, returns items shuffled,
    /// drops the listed IDs on their first `drop_rounds` submissions and
    /// adds an unrequested ID to every reply. Each call yields to the runtime
    /// before answering so concurrent batches overlap.
    pub struct ScriptedTranslator {
        pub drop_ids: HashSet<String>,
        pub drop_rounds: usize,
        pub seen: Mutex<HashMap<String, usize>>,
        pub calls: Mutex<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedTranslator {
        pub fn new() -> Self {
            Self {
                drop_ids: HashSet::new(),
                drop_rounds: 0,
                seen: Mutex::new(HashMap::new()),
                calls: Mutex::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub fn dropping(ids: &[&str], rounds: usize) -> Self {
            Self {
                drop_ids: ids.iter().map(|s| s.to_string()).collect(),
                drop_rounds: rounds,
                ..Self::new()
            }
        }

        pub fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        /// Most relay calls that were in flight at the same time.
        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        /// Slot IDs this translator was asked for, sorted.
        pub fn requested_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self.seen.lock().unwrap().keys().cloned().collect();
            ids.sort();
            ids
        }
    }

    impl Translator for ScriptedTranslator {
        async fn translate_batch(&self, batch: &TranslationBatch) -> Result<Vec<TranslationItem>> {
            *self.calls.lock().unwrap() += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut out = Vec::new();
            let mut seen = self.seen.lock().unwrap();
            for item in &batch.items {
                let n = seen.entry(item.id.clone()).or_insert(0);
                *n += 1;
                if self.drop_ids.contains(&item.id) && *n <= self.drop_rounds {
                    continue;
                }
                out.push(TranslationItem {
                    id: item.id.clone(),
                    text: format!("譯:{}", item.text),
                });
            }
            out.push(TranslationItem {
                id: "stray#content".to_string(),
                text: "多餘".to_string(),
            });
            out.shuffle(&mut rand::rngs::StdRng::seed_from_u64(batch.items.len() as u64));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedTranslator;
    use super::*;
    use crate::corpus::types::{
        DocRole, Document, ProvenanceRecord, Question, QuestionType,
    };

    fn doc(id: &str, source: SourceDataset, content: &str) -> Document {
        Document {
            doc_id: id.to_string(),
            content: content.to_string(),
            original_source: source,
            original_id: id.to_string(),
            is_gold: false,
        }
    }

    fn pool() -> Pool {
        Pool::new(
            vec![
                doc("d_paris", SourceDataset::HotpotQa, "Paris hosts the Eiffel Tower."),
                doc("d_tower", SourceDataset::HotpotQa, "The Eiffel Tower is iron."),
                doc("d_lyon", SourceDataset::HotpotQa, "Lyon is a city."),
                doc("d_tw", SourceDataset::Drcd, "台北是首都。"),
                doc("d_bg", SourceDataset::Squad, "Background text."),
            ],
            vec![
                Question {
                    question_id: "q_h".to_string(),
                    question: "What is the Eiffel Tower made of?".to_string(),
                    gold_answer: "iron".to_string(),
                    gold_doc_ids: vec!["d_paris".to_string(), "d_tower".to_string()],
                    source_dataset: SourceDataset::HotpotQa,
                    question_type: QuestionType::MultiHop,
                },
                Question {
                    question_id: "q_d".to_string(),
                    question: "首都是哪裡？".to_string(),
                    gold_answer: "台北".to_string(),
                    gold_doc_ids: vec!["d_tw".to_string()],
                    source_dataset: SourceDataset::Drcd,
                    question_type: QuestionType::SingleHop,
                },
            ],
        )
    }

    fn provenance() -> Provenance {
        Provenance {
            random_seed: 11,
            target_pool_size: 5,
            created_at: 0,
            documents: vec![ProvenanceRecord {
                doc_id: "d_lyon".to_string(),
                source: SourceDataset::HotpotQa,
                role: DocRole::HardNegative,
                gold_for: vec![],
                hard_negative_for: vec!["q_h".to_string()],
            }],
        }
    }

    fn options(batch_size: usize) -> RelayOptions {
        RelayOptions {
            batch_size,
            concurrency: 3,
            max_batch_retries: 2,
        }
    }

    #[test]
    fn test_slot_id_format() {
        assert_eq!(slot_id("q_abc", SlotField::GoldAnswer), "q_abc#gold_answer");
        assert_eq!(slot_id("doc_1", SlotField::Content), "doc_1#content");
    }

    #[test]
    fn test_clusters_join_questions_with_linked_documents() {
        let pool = pool();
        let provenance = provenance();
        let clusters = build_clusters(&pool, Some(&provenance));
        assert_eq!(clusters[0], vec!["q_h", "d_paris", "d_tower", "d_lyon"]);
        assert_eq!(clusters[1], vec!["q_d", "d_tw"]);
        assert_eq!(clusters[2], vec!["d_bg"]);
    }

    #[test]
    fn test_batches_share_cluster_glossary() {
        let pool = pool();
        let provenance = provenance();
        let batches = plan_batches(&pool, Some(&provenance), 2, &HashSet::new());
        // q_h (2 slots) + 3 docs in cluster 0, the DRCD cluster is skipped.
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[0].label, "cluster-0/0");
        assert_eq!(batches[2].label, "cluster-0/2");
        assert_eq!(batches[0].glossary, batches[2].glossary);
        assert!(batches[0].glossary.contains(&"Eiffel Tower".to_string()));
        assert_eq!(batches[3].items[0].id, "d_bg#content");
    }

    #[tokio::test]
    async fn test_translation_reassembles_by_id() {
        let pool = pool();
        let translator = ScriptedTranslator::new();
        let (translated, stats) =
            translate_pool(&pool, None, &translator, options(2), None).await.unwrap();

        assert_eq!(stats.slots, 6);
        assert_eq!(stats.translated, 6);
        let ids = |p: &Pool| -> Vec<String> {
            p.documents.iter().map(|d| d.doc_id.clone()).collect()
        };
        assert_eq!(ids(&translated), ids(&pool));
        assert_eq!(translated.questions[0].question, "譯:What is the Eiffel Tower made of?");
        assert_eq!(translated.questions[0].gold_answer, "譯:iron");
        assert_eq!(translated.questions[0].gold_doc_ids, pool.questions[0].gold_doc_ids);
        assert_eq!(translated.documents[0].content, "譯:Paris hosts the Eiffel Tower.");
        // DRCD text passes through.
        assert_eq!(translated.documents[3], pool.documents[3]);
        assert_eq!(translated.questions[1], pool.questions[1]);
    }

    #[tokio::test]
    async fn test_missing_ids_are_resubmitted() {
        let translator = ScriptedTranslator::dropping(&["d_lyon#content"], 1);
        let batch = TranslationBatch {
            label: "b".to_string(),
            glossary: vec![],
            items: vec![
                TranslationItem { id: "d_paris#content".to_string(), text: "Paris.".to_string() },
                TranslationItem { id: "d_lyon#content".to_string(), text: "Lyon.".to_string() },
            ],
        };
        let items = translate_checked(&translator, &batch, 2).await.unwrap();
        assert_eq!(translator.calls(), 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text, "譯:Lyon.");
    }

    #[tokio::test]
    async fn test_persistent_gap_is_a_batch_mismatch() {
        let translator = ScriptedTranslator::dropping(&["d_lyon#content"], 10);
        let batch = TranslationBatch {
            label: "cluster-0/1".to_string(),
            glossary: vec![],
            items: vec![TranslationItem { id: "d_lyon#content".to_string(), text: "Lyon.".to_string() }],
        };
        let err = translate_checked(&translator, &batch, 2).await.unwrap_err();
        assert_eq!(translator.calls(), 3);
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::TranslationBatchMismatch { batch, missing }) => {
                assert_eq!(batch, "cluster-0/1");
                assert_eq!(missing, &vec!["d_lyon#content".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkpoint_skips_finished_slots() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::open(dir.path()).await.unwrap();
        let pool = pool();

        let first = ScriptedTranslator::new();
        let (a, _) = translate_pool(&pool, None, &first, options(4), Some(&checkpoint))
            .await
            .unwrap();

        let second = ScriptedTranslator::new();
        let (b, stats) = translate_pool(&pool, None, &second, options(4), Some(&checkpoint))
            .await
            .unwrap();
        assert_eq!(second.calls(), 0);
        assert_eq!(stats.reused, 6);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_english_passage_quoting_a_native_name_is_translated() {
        let text = "Beijing (北京) is the capital of the People's Republic of China.";
        assert!(needs_translation(SourceDataset::Squad, text));
        assert!(!needs_translation(SourceDataset::Drcd, text));
        assert!(!needs_translation(SourceDataset::Squad, "北京是中華人民共和國的首都。"));

        let pool = Pool::new(vec![doc("d_bj", SourceDataset::Squad, text)], vec![]);
        let translator = ScriptedTranslator::new();
        let (translated, stats) =
            translate_pool(&pool, None, &translator, options(2), None).await.unwrap();
        assert_eq!(translator.requested_ids(), vec!["d_bj#content".to_string()]);
        assert_eq!(stats.translated, 1);
        assert_eq!(translated.documents[0].content, format!("譯:{}", text));
    }

    #[tokio::test]
    async fn test_relay_never_exceeds_concurrency() {
        let pool = pool();
        let translator = ScriptedTranslator::new();
        // One slot per batch gives six batches for three slots in flight.
        let opts = options(1);
        let (_, stats) = translate_pool(&pool, None, &translator, opts, None).await.unwrap();
        assert_eq!(stats.batches, 6);
        assert!(translator.peak_concurrency() <= opts.concurrency);
        assert!(translator.peak_concurrency() > 1);
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::open(dir.path()).await.unwrap();
        let pool = pool();
        let sequential = RelayOptions {
            batch_size: 2,
            concurrency: 1,
            max_batch_retries: 2,
        };

        // Batches run in plan order: q_h, d_paris + d_tower, d_lyon, d_bg.
        // The d_lyon batch never comes back complete, so d_bg is never sent.
        let failing = ScriptedTranslator::dropping(&["d_lyon#content"], 10);
        let err = translate_pool(&pool, None, &failing, sequential, Some(&checkpoint))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TranslationBatchMismatch { .. })
        ));
        assert_eq!(checkpoint.entries().await.unwrap().len(), 4);

        let healthy = ScriptedTranslator::new();
        let (translated, stats) =
            translate_pool(&pool, None, &healthy, sequential, Some(&checkpoint))
                .await
                .unwrap();
        assert_eq!(
            healthy.requested_ids(),
            vec!["d_bg#content".to_string(), "d_lyon#content".to_string()]
        );
        assert_eq!(stats.reused, 4);
        assert_eq!(stats.translated, 2);
        assert_eq!(translated.documents[2].content, "譯:Lyon is a city.");
        assert_eq!(translated.documents[4].content, "譯:Background text.");
    }
}
