use std::collections::HashMap;

use crate::corpus::types::SourceDataset;
use crate::error::PipelineError;

/// What an issued identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Document,
    Question,
}

impl IdKind {
    fn prefix(&self) -> &'static str {
        match self {
            IdKind::Document => "doc",
            IdKind::Question => "q",
        }
    }
}

/// Issues and tracks every identifier used within one pipeline run.
///
/// Identifiers are derived from `(kind, source, native key)` with blake3, so
/// rerunning on the same snapshot reproduces them. Issuing the same derived
/// identifier twice means a native key was reused, which is always an error:
/// `original_id` values are not unique enough to stand in for pool IDs.
#[derive(Debug, Default)]
pub struct IdRegistry {
    issued: HashMap<String, IdKind>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and claim a fresh identifier for a record of `source` keyed by `native_key`.
    pub fn allocate(
        &mut self,
        kind: IdKind,
        source: SourceDataset,
        native_key: &str,
    ) -> Result<String, PipelineError> {
        let id = derive_id(kind, source, native_key);
        self.register(kind, &id)?;
        Ok(id)
    }

    /// Claim an identifier supplied from outside the registry (e.g. a
    /// previously persisted artifact).
    pub fn register(&mut self, kind: IdKind, id: &str) -> Result<(), PipelineError> {
        if self.issued.contains_key(id) {
            return Err(PipelineError::DuplicateIdentifier { id: id.to_string() });
        }
        self.issued.insert(id.to_string(), kind);
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Option<IdKind> {
        self.issued.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.issued.contains_key(id)
    }

    /// Forget an identifier whose entity left the pool. It can be issued again.
    pub fn release(&mut self, id: &str) {
        self.issued.remove(id);
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }
}

/// Identifier the registry would issue for this record, without claiming it.
pub fn derive_id(kind: IdKind, source: SourceDataset, native_key: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.prefix().as_bytes());
    hasher.update(b"\0");
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(native_key.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("{}_{}", kind.prefix(), &hex[..24])
}
