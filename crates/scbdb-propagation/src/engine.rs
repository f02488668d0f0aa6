//! The engine facade: owns the active snapshot/graph pair and serves queries.
//!
//! Readers clone the `Arc` of the active pair once per query and work against
//! that pair only, so a query never straddles two versions. A rebuild builds
//! the replacement off to the side and publishes it with a single pointer swap
//! under the write lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use scbdb_core::{ConfigError, EngineConfig, EntityState};

use crate::cache::{CacheKey, CachedValue, ResultCache};
use crate::criticality::CriticalityRanker;
use crate::echo::EchoCalculator;
use crate::error::EngineError;
use crate::graph::PropagationGraph;
use crate::monte_carlo::MonteCarloSimulator;
use crate::propagation::Scratch;
use crate::signal::SignalGenerator;
use crate::snapshot::Snapshot;
use crate::types::{EchoProfile, EchoResult, HealthReport, MonteCarloReport, Scope, TradingSignal};

/// One published snapshot together with the graph built from it.
#[derive(Debug)]
pub struct ActiveGraph {
    snapshot: Snapshot,
    graph: PropagationGraph,
}

impl ActiveGraph {
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn graph(&self) -> &PropagationGraph {
        &self.graph
    }

    /// When the published snapshot was built; `None` for the empty version 0.
    #[must_use]
    pub fn rebuilt_at(&self) -> Option<DateTime<Utc>> {
        (self.version() > 0).then_some(self.snapshot.built_at())
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }
}

/// Whether a cache lookup counts towards the reported hit rate. Each public
/// query counts exactly one lookup; inner lookups it makes are uncounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Counted,
    Uncounted,
}

/// Clears the rebuild flag however the rebuild ends.
struct RebuildGuard<'a>(&'a AtomicBool);

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PropagationEngine {
    config: EngineConfig,
    pool: rayon::ThreadPool,
    active: RwLock<Arc<ActiveGraph>>,
    next_version: AtomicU64,
    rebuilding: AtomicBool,
    cache: ResultCache,
}

impl PropagationEngine {
    /// Create an engine holding the empty version-0 snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `config` fails validation, or
    /// [`ConfigError::InvalidEnvVar`] if the worker pool cannot be started.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_workers())
            .thread_name(|i| format!("scbdb-propagation-{i}"))
            .build()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: "SCBDB_WORKER_THREADS".to_string(),
                reason: e.to_string(),
            })?;
        let snapshot = Snapshot::empty();
        let graph = PropagationGraph::build(&snapshot, &config.graph);
        let cache = ResultCache::new(&config.cache);

        Ok(Self {
            config,
            pool,
            active: RwLock::new(Arc::new(ActiveGraph { snapshot, graph })),
            next_version: AtomicU64::new(1),
            rebuilding: AtomicBool::new(false),
            cache,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The currently published pair. Holding the returned `Arc` pins it.
    #[must_use]
    pub fn current(&self) -> Arc<ActiveGraph> {
        Arc::clone(&self.active.read())
    }

    #[must_use]
    pub fn snapshot_version(&self) -> u64 {
        self.current().version()
    }

    /// Echo magnitude and stability class for one entity.
    ///
    /// `delta` and `horizon` default to the configured echo settings.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if the id is not in the active snapshot,
    /// [`EngineError::InvalidParameter`] for a non-finite delta or a horizon
    /// outside `1..=max_horizon`.
    pub fn compute_echo(
        &self,
        entity_id: &str,
        delta: Option<f64>,
        horizon: Option<usize>,
    ) -> Result<EchoResult, EngineError> {
        let active = self.current();
        let (delta, horizon) = self.echo_params(delta, horizon, active.version())?;
        let idx = active.snapshot.require(entity_id)?;
        Ok(self.echo_for(&active, idx, delta, horizon, Lookup::Counted))
    }

    /// Echo of one entity with the `limit` entities it moved most.
    ///
    /// # Errors
    ///
    /// Same as [`PropagationEngine::compute_echo`].
    pub fn echo_profile(
        &self,
        entity_id: &str,
        delta: Option<f64>,
        horizon: Option<usize>,
        limit: usize,
    ) -> Result<EchoProfile, EngineError> {
        let active = self.current();
        let (delta, horizon) = self.echo_params(delta, horizon, active.version())?;
        let idx = active.snapshot.require(entity_id)?;
        let calc = EchoCalculator::new(&active.snapshot, &active.graph, &self.config.echo);
        Ok(calc.profile(idx, delta, horizon, limit))
    }

    /// Distribution of echo magnitudes under random perturbations in `scope`.
    ///
    /// An unseeded run draws a seed and reports it, so it can be replayed.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidScope`] if the scope matches nothing,
    /// [`EngineError::InvalidParameter`] for `trials == 0`.
    pub fn run_monte_carlo(
        &self,
        scope: &Scope,
        trials: Option<usize>,
        seed: Option<u64>,
    ) -> Result<MonteCarloReport, EngineError> {
        let active = self.current();
        let version = active.version();
        let trials = trials.unwrap_or(self.config.monte_carlo.trials);
        if trials == 0 {
            return Err(EngineError::InvalidParameter {
                name: "trials",
                reason: "must be at least 1".to_string(),
                snapshot_version: version,
            });
        }
        let targets = active.snapshot.resolve_scope(scope)?;
        let seed = seed.unwrap_or_else(rand::random);

        let calc = EchoCalculator::new(&active.snapshot, &active.graph, &self.config.echo);
        let report = self.pool.install(|| {
            MonteCarloSimulator::new(&calc, &self.config.monte_carlo).run(
                scope.clone(),
                &targets,
                trials,
                seed,
                self.config.echo.horizon,
            )
        });

        tracing::info!(
            scope = %scope,
            snapshot_version = version,
            seed,
            trials = report.trials_completed,
            partial = report.partial,
            elapsed_ms = report.elapsed_ms,
            "monte carlo run complete"
        );
        Ok(report)
    }

    /// The `top_k` most critical entities in `scope` (all entities if `None`).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidParameter`] for `top_k == 0`,
    /// [`EngineError::InvalidScope`] if the scope matches nothing.
    pub fn rank_critical(
        &self,
        top_k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<EchoResult>, EngineError> {
        let active = self.current();
        if top_k == 0 {
            return Err(EngineError::InvalidParameter {
                name: "top_k",
                reason: "must be at least 1".to_string(),
                snapshot_version: active.version(),
            });
        }
        let candidates = active.snapshot.resolve_scope(scope.unwrap_or(&Scope::All))?;

        let calc = EchoCalculator::new(&active.snapshot, &active.graph, &self.config.echo);
        let ranker = CriticalityRanker::new(&calc, &self.config.criticality);
        Ok(self.pool.install(|| {
            ranker.rank(
                &candidates,
                top_k,
                self.config.echo.delta,
                self.config.echo.horizon,
            )
        }))
    }

    /// BUY / HOLD / SELL for one entity at the default echo parameters.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if the id is not in the active snapshot,
    /// [`EngineError::InsufficientData`] if it has no observations.
    pub fn generate_signal(&self, entity_id: &str) -> Result<TradingSignal, EngineError> {
        let active = self.current();
        let version = active.version();
        let idx = active.snapshot.require(entity_id)?;
        let entity = active.snapshot.entity(idx);
        if entity.observation_count == 0 {
            return Err(EngineError::InsufficientData {
                entity_id: entity_id.to_string(),
                snapshot_version: version,
            });
        }

        let key = CacheKey::signal(entity_id, version);
        if let Some(CachedValue::Signal(signal)) = self.cache.get(&key) {
            return Ok(signal);
        }

        let echo = self.echo_for(
            &active,
            idx,
            self.config.echo.delta,
            self.config.echo.horizon,
            Lookup::Uncounted,
        );
        let signal = SignalGenerator::new(&self.config.signal, self.config.echo.chaotic_threshold)
            .generate(entity, &echo);
        self.cache.insert(key, CachedValue::Signal(signal.clone()));
        Ok(signal)
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        let active = self.current();
        HealthReport {
            snapshot_version: active.version(),
            entity_count: active.snapshot.len(),
            brand_count: active.snapshot.brand_count(),
            city_count: active.snapshot.city_count(),
            edge_count: active.graph.edge_count(),
            cache_hit_rate: self.cache.hit_rate(),
            cache_entries: self.cache.len(),
            rebuild_in_progress: self.rebuilding.load(Ordering::Acquire),
            last_rebuild_at: active.rebuilt_at(),
        }
    }

    /// Build a snapshot and graph from `entities` and publish them.
    ///
    /// Returns the new snapshot version. On any failure the previously active
    /// pair stays in place.
    ///
    /// # Errors
    ///
    /// [`EngineError::RebuildInProgress`] if another rebuild is running,
    /// [`EngineError::InvalidSnapshot`] for rejected input,
    /// [`EngineError::GraphBuild`] if the built graph fails its check.
    pub fn rebuild(&self, entities: Vec<EntityState>) -> Result<u64, EngineError> {
        if self
            .rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let active_version = self.snapshot_version();
            tracing::warn!(
                snapshot_version = active_version,
                "rebuild rejected: another rebuild is in progress"
            );
            return Err(EngineError::RebuildInProgress {
                snapshot_version: active_version,
            });
        }
        let _guard = RebuildGuard(&self.rebuilding);

        let active_version = self.snapshot_version();
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        tracing::info!(
            snapshot_version = version,
            entity_count = entities.len(),
            "rebuild started"
        );

        let snapshot = Snapshot::build(version, entities, active_version).inspect_err(|e| {
            tracing::warn!(snapshot_version = active_version, error = %e, "rebuild aborted");
        })?;
        let graph = self
            .pool
            .install(|| PropagationGraph::build(&snapshot, &self.config.graph));
        if let Err(reason) = graph.check_row_stochastic() {
            tracing::warn!(snapshot_version = active_version, %reason, "rebuild aborted: graph check failed");
            return Err(EngineError::GraphBuild {
                reason,
                snapshot_version: active_version,
            });
        }

        let entity_count = snapshot.len();
        let edge_count = graph.edge_count();
        let next = Arc::new(ActiveGraph { snapshot, graph });
        *self.active.write() = next;
        self.cache.invalidate_all();

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            snapshot_version = version,
            previous_version = active_version,
            entity_count,
            edge_count,
            elapsed_ms,
            "rebuild published"
        );
        Ok(version)
    }

    fn echo_params(
        &self,
        delta: Option<f64>,
        horizon: Option<usize>,
        snapshot_version: u64,
    ) -> Result<(f64, usize), EngineError> {
        let delta = delta.unwrap_or(self.config.echo.delta);
        let horizon = horizon.unwrap_or(self.config.echo.horizon);
        if !delta.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "delta",
                reason: format!("must be finite, got {delta}"),
                snapshot_version,
            });
        }
        let max_horizon = self.config.echo.max_horizon;
        if horizon == 0 || horizon > max_horizon {
            return Err(EngineError::InvalidParameter {
                name: "horizon",
                reason: format!("must be within 1..={max_horizon}, got {horizon}"),
                snapshot_version,
            });
        }
        Ok((delta, horizon))
    }

    fn echo_for(
        &self,
        active: &ActiveGraph,
        idx: usize,
        delta: f64,
        horizon: usize,
        lookup: Lookup,
    ) -> EchoResult {
        let entity_id = &active.snapshot.entity(idx).entity_id;
        let key = CacheKey::echo(entity_id, delta, horizon, active.version());
        let cached = match lookup {
            Lookup::Counted => self.cache.get(&key),
            Lookup::Uncounted => self.cache.peek(&key),
        };
        if let Some(CachedValue::Echo(result)) = cached {
            return result;
        }

        let calc = EchoCalculator::new(&active.snapshot, &active.graph, &self.config.echo);
        let result = calc.evaluate(idx, delta, horizon, &mut Scratch::new());
        self.cache.insert(key, CachedValue::Echo(result.clone()));
        result
    }
}
