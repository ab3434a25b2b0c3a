//! In-memory case store.
//!
//! Implements both collaborator traits so the pipeline and retrieval can run
//! without a database. Records and vectors live in separate locks; a vector
//! is only accepted for a record that already exists.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use verdict_core::{
    CaseId, CaseLookup, CaseRecord, CaseSubmission, FlatIndex, IndexError, JudgmentSink,
    Neighbor, SinkError, VectorIndex,
};

#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    records: RwLock<BTreeMap<CaseId, CaseRecord>>,
    index: RwLock<FlatIndex>,
    next_id: AtomicU64,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose index rejects vectors of any other dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            index: RwLock::new(FlatIndex::with_dimension(dimension)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records with an attached embedding.
    pub fn indexed(&self) -> usize {
        self.index.read().len()
    }

    /// All records, ordered by id.
    pub fn records(&self) -> Vec<CaseRecord> {
        self.records.read().values().cloned().collect()
    }
}

impl JudgmentSink for InMemoryCaseStore {
    fn persist(&self, submission: CaseSubmission) -> Result<CaseId, SinkError> {
        let id = CaseId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = CaseRecord::from_submission(id, submission);
        self.records.write().insert(id, record);
        debug!(case_id = %id, "case persisted");
        Ok(id)
    }

    fn attach_embedding(&self, id: CaseId, vector: Vec<f32>) -> Result<(), SinkError> {
        if !self.records.read().contains_key(&id) {
            return Err(SinkError::NotFound(id));
        }
        self.index.write().insert(id, vector)?;
        Ok(())
    }
}

impl CaseLookup for InMemoryCaseStore {
    fn get(&self, id: CaseId) -> Option<CaseRecord> {
        self.records.read().get(&id).cloned()
    }

    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.index.read().nearest(query, k)
    }
}
