//! In-memory analysis registry
//!
//! Shared by every request. Lookups on different analyses never contend;
//! mutations of one analysis are serialized by its own mutex. Locks are only
//! held inside [`AnalysisStore::mutate`] closures, which are synchronous, so
//! no lock can be held across an external call.

use crate::error::{PipelineError, PipelineResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use stride_model::{Analysis, AnalysisId};

/// Registry of analyses keyed by id
#[derive(Debug, Default)]
pub struct AnalysisStore {
    analyses: DashMap<AnalysisId, Arc<Mutex<Analysis>>>,
}

impl AnalysisStore {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analysis, replacing any entry with the same id
    pub fn create(&self, analysis: Analysis) -> AnalysisId {
        let id = analysis.id;
        self.analyses.insert(id, Arc::new(Mutex::new(analysis)));
        tracing::debug!(analysis_id = %id, "registered analysis");
        id
    }

    /// Snapshot of an analysis
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub fn get(&self, id: &AnalysisId) -> PipelineResult<Analysis> {
        let entry = self.entry(id)?;
        let snapshot = entry.lock().clone();
        Ok(snapshot)
    }

    /// Run `f` with exclusive access to one analysis
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub fn mutate<R>(&self, id: &AnalysisId, f: impl FnOnce(&mut Analysis) -> R) -> PipelineResult<R> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock();
        Ok(f(&mut guard))
    }

    /// Check if an analysis is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &AnalysisId) -> bool {
        self.analyses.contains_key(id)
    }

    /// Number of registered analyses
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    /// Current revision of an analysis, without cloning it
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub fn revision(&self, id: &AnalysisId) -> PipelineResult<u64> {
        self.mutate(id, |analysis| analysis.revision)
    }

    // The DashMap shard guard is released before the per-analysis mutex is
    // taken, so a slow mutation never blocks unrelated ids on the same shard.
    fn entry(&self, id: &AnalysisId) -> PipelineResult<Arc<Mutex<Analysis>>> {
        self.analyses
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PipelineError::AnalysisNotFound(*id))
    }
}
