//! KPI computation with read-through caching.
//!
//! Concurrent misses on one cache key share a single computation.

use crate::alerts::AlertEvaluator;
use crate::cache::{CacheKey, CacheLayer};
use crate::core::clock::{Clock, SystemClock};
use crate::core::{Error, Result};
use crate::kpi::{KpiDefinition, KpiParams, KpiRegistry, MetricSnapshot};
use crate::monitoring::EngineMetrics;
use crate::notify::AnalyticsSink;
use crate::source::MetricSource;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

type Computation = Shared<BoxFuture<'static, Result<MetricSnapshot>>>;

/// In-flight computations by key, tagged with a generation so a finished
/// computation only removes its own entry.
type InFlight = Mutex<HashMap<CacheKey, (u64, Computation)>>;

/// Computes KPI snapshots, serving repeat requests from cache.
///
/// Cloning is cheap; clones share the cache, metrics and in-flight table.
#[derive(Clone)]
pub struct AnalyticsEngine {
    registry: Arc<KpiRegistry>,
    source: Arc<dyn MetricSource>,
    cache: Arc<dyn CacheLayer>,
    clock: Arc<dyn Clock>,
    alerts: Option<Arc<AlertEvaluator>>,
    sink: Option<Arc<dyn AnalyticsSink>>,
    metrics: Arc<EngineMetrics>,
    in_flight: Arc<InFlight>,
    generation: Arc<AtomicU64>,
    /// Serializes cache writes against invalidation
    store_gate: Arc<tokio::sync::Mutex<()>>,
}

impl AnalyticsEngine {
    /// Create an engine over a registry, metric source and cache.
    pub fn new(
        registry: Arc<KpiRegistry>,
        source: Arc<dyn MetricSource>,
        cache: Arc<dyn CacheLayer>,
    ) -> Self {
        Self {
            registry,
            source,
            cache,
            clock: Arc::new(SystemClock),
            alerts: None,
            sink: None,
            metrics: Arc::new(EngineMetrics::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            store_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Use a custom clock for snapshot timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate alerts over freshly computed company-wide snapshots.
    ///
    /// Snapshots computed with filters describe a slice of the business and
    /// never raise or resolve alerts.
    pub fn with_alerts(mut self, alerts: Arc<AlertEvaluator>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Report freshly computed snapshots to a sink.
    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registry in use.
    pub fn registry(&self) -> &Arc<KpiRegistry> {
        &self.registry
    }

    /// Attached alert evaluator.
    pub fn alerts(&self) -> Option<&Arc<AlertEvaluator>> {
        self.alerts.as_ref()
    }

    /// Engine counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Current time by the engine clock.
    pub fn now(&self) -> crate::core::Timestamp {
        self.clock.now()
    }

    /// Snapshot of a KPI for the given parameters.
    ///
    /// A live cached snapshot is returned unchanged. Otherwise the formula
    /// runs against the metric source and the result is cached for the
    /// KPI's TTL. Source failures are returned as-is; no stale value is
    /// served in their place.
    pub async fn compute(&self, kpi_id: &str, params: &KpiParams) -> Result<MetricSnapshot> {
        params.validate()?;
        let definition = self.registry.get(kpi_id)?;
        let params = params.normalized();
        let key = CacheKey::new(kpi_id, &params);

        if let Some(snapshot) = self.cache.get(&key).await {
            self.metrics.cache_hits.inc();
            tracing::debug!(kpi = %kpi_id, key = %key, "KPI served from cache");
            return Ok(snapshot);
        }
        self.metrics.cache_misses.inc();

        self.join_or_start(definition, params, key).await
    }

    /// Compute several KPIs concurrently. Results keep the order of `kpi_ids`.
    pub async fn compute_many<S: AsRef<str>>(
        &self,
        kpi_ids: &[S],
        params: &KpiParams,
    ) -> Vec<(String, Result<MetricSnapshot>)> {
        let results = join_all(kpi_ids.iter().map(|id| self.compute(id.as_ref(), params))).await;
        kpi_ids
            .iter()
            .map(|id| id.as_ref().to_string())
            .zip(results)
            .collect()
    }

    /// Drop the cached snapshot and recompute.
    pub async fn refresh(&self, kpi_id: &str, params: &KpiParams) -> Result<MetricSnapshot> {
        params.validate()?;
        self.registry.get(kpi_id)?;
        self.invalidate(kpi_id, params).await;
        self.compute(kpi_id, params).await
    }

    /// Drop the cached snapshot for one parameter set.
    ///
    /// Returns whether an entry was removed. A computation already in flight
    /// for the key still answers its waiters, but its result is not cached;
    /// later callers start a new one.
    pub async fn invalidate(&self, kpi_id: &str, params: &KpiParams) -> bool {
        let key = CacheKey::new(kpi_id, &params.normalized());
        self.metrics.invalidations.inc();
        let removed = {
            let _gate = self.store_gate.lock().await;
            self.lock_in_flight().remove(&key);
            self.cache.invalidate(&key).await
        };
        tracing::debug!(kpi = %kpi_id, key = %key, removed, "KPI invalidated");
        removed
    }

    /// Drop every cached parameter variant of a KPI.
    pub async fn invalidate_kpi(&self, kpi_id: &str) -> usize {
        self.metrics.invalidations.inc();
        let removed = {
            let _gate = self.store_gate.lock().await;
            self.lock_in_flight().retain(|key, _| key.kpi_id != kpi_id);
            self.cache.invalidate_kpi(kpi_id).await
        };
        tracing::info!(kpi = %kpi_id, removed, "KPI cache cleared");
        removed
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, (u64, Computation)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `generation` is still the registered computation for `key`.
    fn is_current(&self, key: &CacheKey, generation: u64) -> bool {
        matches!(self.lock_in_flight().get(key), Some((g, _)) if *g == generation)
    }

    fn join_or_start(&self, definition: Arc<KpiDefinition>, params: KpiParams, key: CacheKey) -> Computation {
        let mut in_flight = self.lock_in_flight();
        if let Some((_, computation)) = in_flight.get(&key) {
            self.metrics.coalesced_waits.inc();
            tracing::debug!(kpi = %key.kpi_id, key = %key, "joining in-flight computation");
            return computation.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let engine = self.clone();
        let task_key = key.clone();
        let computation = async move { engine.run(definition, params, task_key, generation).await }
            .boxed()
            .shared();
        in_flight.insert(key, (generation, computation.clone()));
        computation
    }

    async fn run(
        &self,
        definition: Arc<KpiDefinition>,
        params: KpiParams,
        key: CacheKey,
        generation: u64,
    ) -> Result<MetricSnapshot> {
        let outcome = self.compute_fresh(&definition, &params, &key, generation).await;

        // The cache is already populated, so late callers hit it.
        let mut in_flight = self.lock_in_flight();
        if matches!(in_flight.get(&key), Some((g, _)) if *g == generation) {
            in_flight.remove(&key);
        }

        outcome
    }

    async fn compute_fresh(
        &self,
        definition: &KpiDefinition,
        params: &KpiParams,
        key: &CacheKey,
        generation: u64,
    ) -> Result<MetricSnapshot> {
        if let Some(snapshot) = self.cache.get(key).await {
            return Ok(snapshot);
        }

        self.metrics.computations.inc();
        let started = Instant::now();
        let value = match definition.formula.evaluate(self.source.as_ref(), params).await {
            Ok(value) => value,
            Err(e) => {
                if matches!(e, Error::SourceUnavailable(_)) {
                    self.metrics.source_failures.inc();
                }
                tracing::warn!(
                    kpi = %definition.id,
                    source = self.source.name(),
                    error = %e,
                    "KPI computation failed"
                );
                return Err(e);
            }
        };
        let elapsed = started.elapsed();
        self.metrics.compute_seconds.observe(elapsed.as_secs_f64());

        if !value.is_finite() {
            tracing::error!(kpi = %definition.id, value, "KPI formula produced a non-finite value");
            return Err(Error::Internal(format!(
                "KPI {} produced non-finite value {}",
                definition.id, value
            )));
        }

        let snapshot = MetricSnapshot::new(definition, params, value, self.clock.now());

        // An invalidation since this computation started makes its value stale.
        let stored = {
            let _gate = self.store_gate.lock().await;
            let current = self.is_current(key, generation);
            if current {
                self.cache.set(key.clone(), snapshot.clone(), definition.ttl).await;
            }
            current
        };
        if !stored {
            tracing::debug!(kpi = %definition.id, key = %key, "KPI invalidated during computation; result not cached");
            return Ok(snapshot);
        }
        tracing::info!(
            kpi = %definition.id,
            value,
            window = %params.window,
            elapsed_ms = elapsed.as_millis() as u64,
            "KPI computed"
        );

        if let Some(sink) = &self.sink {
            sink.snapshot_computed(&snapshot);
        }
        if let Some(alerts) = &self.alerts {
            if params.filters.is_empty() {
                alerts.evaluate(&snapshot, definition);
            }
        }

        Ok(snapshot)
    }
}
