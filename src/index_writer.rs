//! Batched submission of chunks to the search engine.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    document::DocumentChunk,
    engine::SearchEngine,
    error::{Error, Result},
    ingestion::CancelToken,
};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_SUCCESS_PAUSE: Duration = Duration::from_millis(20);
pub const DEFAULT_FAILURE_PAUSE: Duration = Duration::from_millis(250);
pub const DEFAULT_HEALTH_CHECK_EVERY: u64 = 200;
pub const DEFAULT_HEALTH_WAIT_ATTEMPTS: u32 = 30;
pub const DEFAULT_HEALTH_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Batching, retry and pacing policy for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingConfig {
    /// Chunks per `add_documents` call.
    pub batch_size: usize,
    /// Attempts per batch, including the first.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff` before retrying.
    pub retry_backoff: Duration,
    pub success_pause: Duration,
    pub failure_pause: Duration,
    /// Health-check the engine before every n-th batch.
    pub health_check_every: u64,
    pub health_wait_attempts: u32,
    pub health_wait_interval: Duration,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            success_pause: DEFAULT_SUCCESS_PAUSE,
            failure_pause: DEFAULT_FAILURE_PAUSE,
            health_check_every: DEFAULT_HEALTH_CHECK_EVERY,
            health_wait_attempts: DEFAULT_HEALTH_WAIT_ATTEMPTS,
            health_wait_interval: DEFAULT_HEALTH_WAIT_INTERVAL,
        }
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "indexing batch size must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "indexing attempts must be at least 1".into(),
            ));
        }
        if self.health_check_every == 0 {
            return Err(Error::Config(
                "health check interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome counts of one or more submissions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: IndexReport) {
        self.batches_ok += other.batches_ok;
        self.batches_failed += other.batches_failed;
        self.chunks_indexed += other.chunks_indexed;
        self.chunks_failed += other.chunks_failed;
    }

    /// Whether every submitted batch was accepted.
    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0
    }
}

/// Submits chunks to one index in fixed-size batches.
///
/// A batch that still fails after its retries is logged and counted, and
/// submission moves on to the next batch. The batch counter driving
/// periodic health checks spans every call to [`submit`](Self::submit).
pub struct BatchIndexer<'a, E> {
    engine: &'a E,
    uid: &'a str,
    config: &'a IndexingConfig,
    batches_sent: u64,
}

impl<'a, E: SearchEngine> BatchIndexer<'a, E> {
    pub fn new(
        engine: &'a E,
        uid: &'a str,
        config: &'a IndexingConfig,
    ) -> Self {
        Self {
            engine,
            uid,
            config,
            batches_sent: 0,
        }
    }

    /// Submit `chunks`, checking `cancel` before every batch.
    ///
    /// Fails only on cancellation or when the engine does not recover
    /// from a failed periodic health check.
    pub async fn submit(
        &mut self,
        chunks: &[DocumentChunk],
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();

        for batch in chunks.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.batches_sent > 0
                && self.batches_sent % self.config.health_check_every == 0
            {
                self.wait_until_healthy().await?;
            }
            self.batches_sent += 1;

            match self.send_with_retry(batch).await {
                Ok(()) => {
                    report.batches_ok += 1;
                    report.chunks_indexed += batch.len();
                    tokio::time::sleep(self.config.success_pause).await;
                }
                Err(e) => {
                    warn!(
                        index = self.uid,
                        chunks = batch.len(),
                        error = %e,
                        "giving up on batch"
                    );
                    report.batches_failed += 1;
                    report.chunks_failed += batch.len();
                    tokio::time::sleep(self.config.failure_pause).await;
                }
            }
        }

        Ok(report)
    }

    async fn send_with_retry(&self, batch: &[DocumentChunk]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.engine.add_documents(self.uid, batch).await {
                Ok(task) => {
                    debug!(
                        index = self.uid,
                        task = task.task_uid,
                        chunks = batch.len(),
                        "batch enqueued"
                    );
                    return Ok(());
                }
                Err(e)
                    if e.is_retryable() && attempt < self.config.max_attempts =>
                {
                    let backoff = self.config.retry_backoff * attempt;
                    warn!(
                        index = self.uid,
                        attempt,
                        ?backoff,
                        error = %e,
                        "batch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn wait_until_healthy(&self) -> Result<()> {
        for check in 1..=self.config.health_wait_attempts {
            match self.engine.health().await {
                Ok(()) => {
                    if check > 1 {
                        info!(checks = check, "search engine recovered");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(check, error = %e, "search engine unhealthy, waiting");
                    tokio::time::sleep(self.config.health_wait_interval).await;
                }
            }
        }
        Err(Error::EngineUnavailable(format!(
            "engine still unhealthy after {} checks",
            self.config.health_wait_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Call, ScriptedEngine, chunk};

    fn fast_config() -> IndexingConfig {
        IndexingConfig {
            batch_size: 2,
            retry_backoff: Duration::ZERO,
            success_pause: Duration::ZERO,
            failure_pause: Duration::ZERO,
            health_wait_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn chunks(n: usize) -> Vec<DocumentChunk> {
        (0..n).map(|i| chunk(&format!("c-{i}"), "text")).collect()
    }

    /// Virtual time lands on timer wheel ticks, at most a few ms late.
    fn assert_around(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected about {expected:?}, got {elapsed:?}"
        );
    }

    fn unavailable() -> Error {
        Error::EngineUnavailable("connection refused".into())
    }

    #[test]
    fn config_validation() {
        assert!(IndexingConfig::default().validate().is_ok());
        let config = IndexingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn splits_into_fixed_size_batches() {
        let engine = ScriptedEngine::new();
        let config = fast_config();
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let report =
            indexer.submit(&chunks(5), &CancelToken::new()).await.unwrap();

        assert_eq!(report.batches_ok, 3);
        assert_eq!(report.chunks_indexed, 5);
        assert!(report.is_complete());
        let sizes: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddDocuments { count, .. } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let engine = ScriptedEngine::new();
        engine.fail_next_adds(vec![unavailable(), unavailable()]);
        let config = fast_config();
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let report =
            indexer.submit(&chunks(2), &CancelToken::new()).await.unwrap();

        assert_eq!(report.batches_ok, 1);
        assert_eq!(engine.stored("idx").len(), 2);
    }

    #[tokio::test]
    async fn exhausted_batch_is_skipped_not_fatal() {
        let engine = ScriptedEngine::new();
        engine.fail_next_adds(vec![unavailable(), unavailable(), unavailable()]);
        let config = fast_config();
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let report =
            indexer.submit(&chunks(4), &CancelToken::new()).await.unwrap();

        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.chunks_failed, 2);
        assert_eq!(report.batches_ok, 1);
        assert_eq!(report.chunks_indexed, 2);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let engine = ScriptedEngine::new();
        engine.fail_next_adds(vec![Error::EngineStatus {
            status: 400,
            url: "/indexes/idx/documents".into(),
            snippet: "bad".into(),
        }]);
        let config = fast_config();
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let report =
            indexer.submit(&chunks(2), &CancelToken::new()).await.unwrap();

        assert_eq!(report.batches_failed, 1);
        let adds = engine
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::AddDocuments { .. }))
            .count();
        assert_eq!(adds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backoff_grows_linearly() {
        let engine = ScriptedEngine::new();
        engine.fail_next_adds(vec![unavailable(), unavailable()]);
        let config = IndexingConfig {
            batch_size: 2,
            success_pause: Duration::ZERO,
            ..Default::default()
        };
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let started = tokio::time::Instant::now();
        let report =
            indexer.submit(&chunks(2), &CancelToken::new()).await.unwrap();

        assert_eq!(report.batches_ok, 1);
        // 0.5 s after the first failure, 1.0 s after the second.
        assert_around(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batches_pause_longer() {
        let engine = ScriptedEngine::new();
        let config = IndexingConfig {
            batch_size: 1,
            ..Default::default()
        };
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);
        let cancel = CancelToken::new();

        let started = tokio::time::Instant::now();
        indexer.submit(&chunks(1), &cancel).await.unwrap();
        let after_success = started.elapsed();

        engine.fail_next_adds(vec![Error::EngineStatus {
            status: 400,
            url: "/indexes/idx/documents".into(),
            snippet: "bad".into(),
        }]);
        let started = tokio::time::Instant::now();
        let report = indexer.submit(&chunks(1), &cancel).await.unwrap();
        let after_failure = started.elapsed();

        assert_eq!(report.batches_failed, 1);
        assert_around(after_success, DEFAULT_SUCCESS_PAUSE);
        assert_around(after_failure, DEFAULT_FAILURE_PAUSE);
        assert!(after_failure > after_success);
    }

    #[tokio::test]
    async fn health_checks_every_nth_batch_and_waits() {
        let engine = ScriptedEngine::new();
        engine.fail_health_checks(2);
        let config = IndexingConfig {
            batch_size: 1,
            health_check_every: 2,
            ..fast_config()
        };
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let report =
            indexer.submit(&chunks(5), &CancelToken::new()).await.unwrap();

        assert_eq!(report.chunks_indexed, 5);
        let health = engine
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Health))
            .count();
        // Before batches 3 and 5; the first check retries twice.
        assert_eq!(health, 4);
    }

    #[tokio::test]
    async fn gives_up_when_engine_never_recovers() {
        let engine = ScriptedEngine::new();
        engine.set_unhealthy(true);
        let config = IndexingConfig {
            batch_size: 1,
            health_check_every: 1,
            health_wait_attempts: 3,
            ..fast_config()
        };
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);

        let err = indexer
            .submit(&chunks(3), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable(_)));
        assert_eq!(engine.stored("idx").len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let engine = ScriptedEngine::new();
        let config = fast_config();
        let mut indexer = BatchIndexer::new(&engine, "idx", &config);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = indexer.submit(&chunks(4), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(engine.stored("idx").is_empty());
    }
}
