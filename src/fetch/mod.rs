//! Resilient fetcher: cache check, circuit gate, timed operation with
//! exponential-backoff retries, write-through on success, fallback
//! resolution on failure.
//!
//! The outcome type keeps "fresh", "cached", and "stale fallback"
//! unambiguous for callers; `RemoteUnavailable` is returned only when
//! every tier is empty.

pub mod circuit;
pub mod fallback;
pub mod http;
pub mod retry;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{Result, SyncError};
use circuit::{CircuitBreaker, CircuitDecision, CircuitState};
use dashmap::DashMap;
use fallback::FallbackTable;
use log::{debug, info, warn};
use retry::RetryPolicy;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Per-request knobs. `cache_ttl` governs the write-through entry;
/// `fallback` overrides the fetcher's static table for this call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub cache_ttl: Duration,
    pub fallback: Option<Value>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(8_000),
            max_retries: 3,
            cache_ttl: Duration::from_millis(300_000),
            fallback: None,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            cache_ttl: Duration::from_millis(config.cache_default_ttl_ms),
            fallback: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// How the returned value was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// Straight from the network this call
    Fresh(T),
    /// Unexpired cache entry, no network touched
    Cached(T),
    /// Last-known-good or static data; the remote is unhealthy
    Fallback(T),
}

impl<T> FetchOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            FetchOutcome::Fresh(value)
            | FetchOutcome::Cached(value)
            | FetchOutcome::Fallback(value) => value,
        }
    }

    pub fn as_inner(&self) -> &T {
        match self {
            FetchOutcome::Fresh(value)
            | FetchOutcome::Cached(value)
            | FetchOutcome::Fallback(value) => value,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, FetchOutcome::Fresh(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, FetchOutcome::Cached(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FetchOutcome::Fallback(_))
    }
}

/// Executes caller-supplied network operations with timeout, retry,
/// and per-endpoint circuit breaking, backed by a TTL cache and a
/// static fallback table. Owns its cache exclusively.
pub struct ResilientFetcher {
    cache: ResponseCache,
    circuits: DashMap<String, CircuitBreaker>,
    fallback: FallbackTable,
    retry: RetryPolicy,
    failure_threshold: u32,
    failure_window: Duration,
    circuit_open_base: Duration,
    circuit_open_max: Duration,
    sweep_interval: Duration,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl ResilientFetcher {
    pub fn new(config: &Config) -> Self {
        Self::with_fallback(config, FallbackTable::with_defaults())
    }

    pub fn with_fallback(config: &Config, fallback: FallbackTable) -> Self {
        Self {
            cache: ResponseCache::new(config.cache_soft_limit, config.cache_max_entries),
            circuits: DashMap::new(),
            fallback,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ),
            failure_threshold: config.failure_threshold,
            failure_window: Duration::from_millis(config.failure_window_ms),
            circuit_open_base: Duration::from_millis(config.circuit_open_base_ms),
            circuit_open_max: Duration::from_millis(config.circuit_open_max_ms),
            sweep_interval: Duration::from_secs(config.cache_sweep_interval_secs),
            sweeper: None,
        }
    }

    /// Start the periodic cache sweeper at the configured interval.
    /// Idempotent; the task is aborted when the fetcher drops. Must be
    /// called from within a tokio runtime.
    pub fn start_cache_sweeper(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(self.cache.start_sweeper(self.sweep_interval));
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn circuit_state(&self, endpoint_id: &str) -> Option<CircuitState> {
        self.circuits.get(endpoint_id).map(|cb| cb.state())
    }

    pub fn circuit_failure_count(&self, endpoint_id: &str) -> u32 {
        self.circuits
            .get(endpoint_id)
            .map(|cb| cb.failure_count())
            .unwrap_or(0)
    }

    pub async fn invalidate(&self, cache_key: &str) {
        self.cache.invalidate(cache_key).await;
    }

    /// Execute `operation` for `endpoint_id`, honoring cache, circuit,
    /// timeout, retries, and fallback in that order.
    pub async fn request<F, Fut>(
        &self,
        endpoint_id: &str,
        cache_key: &str,
        mut operation: F,
        options: &FetchOptions,
    ) -> Result<FetchOutcome<Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.cache.get(cache_key).await {
            debug!("Cache hit for {}", cache_key);
            return Ok(FetchOutcome::Cached(value));
        }

        let decision = self
            .circuits
            .entry(endpoint_id.to_string())
            .or_insert_with(|| {
                CircuitBreaker::new(
                    self.failure_threshold,
                    self.failure_window,
                    self.circuit_open_base,
                    self.circuit_open_max,
                )
            })
            .try_acquire(endpoint_id);

        match decision {
            CircuitDecision::FastFail => {
                debug!("Circuit open for {}, serving fallback", endpoint_id);
                self.resolve_fallback(endpoint_id, cache_key, options, SyncError::CircuitOpen)
                    .await
            }
            CircuitDecision::Probe => {
                // Exactly one probe call, no retries
                match self.attempt(&mut operation, options).await {
                    Ok(value) => {
                        self.record_success(endpoint_id);
                        self.cache
                            .set(cache_key, value.clone(), options.cache_ttl)
                            .await;
                        Ok(FetchOutcome::Fresh(value))
                    }
                    Err(err) => {
                        self.record_failure(endpoint_id);
                        self.resolve_fallback(endpoint_id, cache_key, options, err)
                            .await
                    }
                }
            }
            CircuitDecision::Proceed => {
                self.request_with_retries(endpoint_id, cache_key, &mut operation, options)
                    .await
            }
        }
    }

    async fn request_with_retries<F, Fut>(
        &self,
        endpoint_id: &str,
        cache_key: &str,
        operation: &mut F,
        options: &FetchOptions,
    ) -> Result<FetchOutcome<Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut last_error = SyncError::RemoteUnavailable(format!(
            "no attempts executed for {}",
            endpoint_id
        ));

        for attempt in 0..=options.max_retries {
            if attempt > 0 {
                let delay = self.retry.jittered_delay_for_attempt(attempt);
                debug!(
                    "Retry {}/{} for {} after {:?}",
                    attempt, options.max_retries, endpoint_id, delay
                );
                sleep(delay).await;
            }

            match self.attempt(operation, options).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("{} succeeded after {} retries", endpoint_id, attempt);
                    }
                    self.record_success(endpoint_id);
                    self.cache
                        .set(cache_key, value.clone(), options.cache_ttl)
                        .await;
                    return Ok(FetchOutcome::Fresh(value));
                }
                Err(err) => {
                    self.record_failure(endpoint_id);
                    let retryable = err.should_retry();
                    last_error = err.warned(&format!(
                        "Attempt {}/{} for {} failed",
                        attempt + 1,
                        options.max_retries + 1,
                        endpoint_id
                    ));
                    if !retryable {
                        break;
                    }
                }
            }
        }

        self.resolve_fallback(endpoint_id, cache_key, options, last_error)
            .await
    }

    /// One timed execution of the operation.
    async fn attempt<F, Fut>(&self, operation: &mut F, options: &FetchOptions) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        match timeout(options.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(format!(
                "operation exceeded {:?}",
                options.timeout
            ))),
        }
    }

    fn record_success(&self, endpoint_id: &str) {
        if let Some(mut cb) = self.circuits.get_mut(endpoint_id) {
            cb.record_success(endpoint_id);
        }
    }

    fn record_failure(&self, endpoint_id: &str) {
        if let Some(mut cb) = self.circuits.get_mut(endpoint_id) {
            cb.record_failure(endpoint_id);
        }
    }

    /// Fallback tiers: last-known-good cache value first, then the
    /// per-call override, then the static table. Only when all three
    /// are empty does the original error surface as RemoteUnavailable.
    async fn resolve_fallback(
        &self,
        endpoint_id: &str,
        cache_key: &str,
        options: &FetchOptions,
        cause: SyncError,
    ) -> Result<FetchOutcome<Value>> {
        if let Some(value) = self.cache.peek_last_good(cache_key).await {
            warn!(
                "Serving last-known-good data for {} ({})",
                endpoint_id, cause
            );
            return Ok(FetchOutcome::Fallback(value));
        }
        if let Some(value) = options.fallback.clone() {
            warn!("Serving per-call fallback for {} ({})", endpoint_id, cause);
            return Ok(FetchOutcome::Fallback(value));
        }
        if let Some(value) = self.fallback.get(endpoint_id) {
            warn!("Serving static fallback for {} ({})", endpoint_id, cause);
            return Ok(FetchOutcome::Fallback(value.clone()));
        }
        Err(SyncError::RemoteUnavailable(format!(
            "{}: retries exhausted and no cache or fallback available ({})",
            endpoint_id, cause
        )))
    }
}

impl Drop for ResilientFetcher {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast_config() -> Config {
        Config {
            max_retries: 0,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 4,
            request_timeout_ms: 50,
            circuit_open_base_ms: 40,
            circuit_open_max_ms: 160,
            ..Config::default()
        }
    }

    fn fast_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(50),
            max_retries: 0,
            cache_ttl: Duration::from_secs(60),
            fallback: None,
        }
    }

    #[tokio::test]
    async fn fresh_result_writes_through_to_cache() {
        let fetcher = ResilientFetcher::new(&fast_config());
        let options = fast_options();

        let outcome = fetcher
            .request(
                "/scores",
                "GET /scores",
                || async { Ok(json!({"home": 4})) },
                &options,
            )
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Fresh(json!({"home": 4})));

        let outcome = fetcher
            .request(
                "/scores",
                "GET /scores",
                || async { panic!("must not hit the network on a cache hit") },
                &options,
            )
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Cached(json!({"home": 4})));
    }

    #[tokio::test]
    async fn exhausted_retries_without_fallback_is_remote_unavailable() {
        let fetcher = ResilientFetcher::with_fallback(&fast_config(), FallbackTable::new());
        let outcome = fetcher
            .request(
                "/standings",
                "GET /standings",
                || async { Err(SyncError::Transport("refused".to_string())) },
                &fast_options(),
            )
            .await;
        assert!(matches!(outcome, Err(SyncError::RemoteUnavailable(_))));
    }

    #[tokio::test]
    async fn per_call_fallback_beats_static_table() {
        let fetcher = ResilientFetcher::new(&fast_config());
        let options = fast_options().with_fallback(json!(["override"]));
        let outcome = fetcher
            .request(
                "/teams",
                "GET /teams",
                || async { Err(SyncError::Transport("refused".to_string())) },
                &options,
            )
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Fallback(json!(["override"])));
    }

    #[tokio::test]
    async fn hard_timeout_counts_as_failure() {
        let fetcher = ResilientFetcher::with_fallback(&fast_config(), FallbackTable::new());
        let options = FetchOptions {
            timeout: Duration::from_millis(20),
            ..fast_options()
        };
        let outcome = fetcher
            .request(
                "/slow",
                "GET /slow",
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!(null))
                },
                &options,
            )
            .await;
        assert!(matches!(outcome, Err(SyncError::RemoteUnavailable(_))));
        assert_eq!(fetcher.circuit_failure_count("/slow"), 1);
    }

    #[tokio::test]
    async fn non_retryable_status_stops_the_retry_loop() {
        let fetcher = ResilientFetcher::with_fallback(&fast_config(), FallbackTable::new());
        let options = fast_options().with_max_retries(5);
        let mut calls = 0u32;
        let result = fetcher
            .request(
                "/roster",
                "GET /roster",
                || {
                    calls += 1;
                    async { Err(SyncError::HttpStatus(404)) }
                },
                &options,
            )
            .await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
        assert_eq!(calls, 1);
    }
}
