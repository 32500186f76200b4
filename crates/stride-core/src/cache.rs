//! Per-analysis report cache using moka
//!
//! Holds the last assembled report of each analysis so repeated report and
//! download requests do not re-run enrichment. Entries carry the analysis
//! revision they were built from; a lookup with any other revision misses.

use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stride_model::{AnalysisId, Report};

#[derive(Debug, Clone)]
struct CachedReport {
    revision: u64,
    report: Arc<Report>,
}

/// Cache of assembled reports keyed by analysis
#[derive(Debug, Clone)]
pub struct ReportCache {
    inner: Cache<AnalysisId, CachedReport>,
}

impl ReportCache {
    /// Create cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get the report cached for exactly this revision
    pub async fn get(&self, id: &AnalysisId, revision: u64) -> Option<Arc<Report>> {
        self.inner
            .get(id)
            .await
            .filter(|cached| cached.revision == revision)
            .map(|cached| cached.report)
    }

    /// Insert report built from `revision`
    #[inline]
    pub async fn insert(&self, id: AnalysisId, revision: u64, report: Arc<Report>) {
        self.inner.insert(id, CachedReport { revision, report }).await;
    }

    /// Get or compute report
    ///
    /// Looks up `revision`; on a miss, `f` returns the report together with
    /// the revision it was actually built from, which is what gets cached.
    /// Errors from `f` are returned as-is and nothing is cached.
    pub async fn try_get_or_insert_with<E, F, Fut>(
        &self,
        id: AnalysisId,
        revision: u64,
        f: F,
    ) -> Result<Arc<Report>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(u64, Report), E>>,
    {
        if let Some(cached) = self.get(&id, revision).await {
            tracing::debug!(analysis_id = %id, revision, "report cache hit");
            return Ok(cached);
        }

        let (built_from, report) = f().await?;
        let report = Arc::new(report);
        self.insert(id, built_from, Arc::clone(&report)).await;
        Ok(report)
    }

    /// Drop the cached report of an analysis
    #[inline]
    pub async fn invalidate(&self, id: &AnalysisId) {
        self.inner.invalidate(id).await;
    }
}

impl Default for ReportCache {
    /// Cache with capacity for 1,000 reports
    fn default() -> Self {
        Self::new(1000)
    }
}
