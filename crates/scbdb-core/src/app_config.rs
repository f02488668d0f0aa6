use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Shape of the geographic-proximity falloff between two located entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximityDecay {
    /// `1 - d / r`, reaching zero at the radius.
    Linear,
    /// Exponential falloff rescaled so it also reaches zero at the radius.
    Exponential,
}

impl std::fmt::Display for ProximityDecay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProximityDecay::Linear => write!(f, "linear"),
            ProximityDecay::Exponential => write!(f, "exponential"),
        }
    }
}

/// Coefficients used by the graph builder for one propagation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphWeights {
    /// Share of row mass an entity keeps on itself (inertia).
    pub self_weight: f64,
    pub brand_weight: f64,
    pub proximity_weight: f64,
    pub city_weight: f64,
    pub category_weight: f64,
    pub proximity_radius_km: f64,
    pub proximity_decay: ProximityDecay,
    /// Optional cap on non-self neighbors kept per row, heaviest first with
    /// ties broken by entity id. `None` keeps every qualifying neighbor.
    pub max_neighbors: Option<usize>,
}

impl Default for GraphWeights {
    fn default() -> Self {
        Self {
            self_weight: 0.70,
            brand_weight: 0.20,
            proximity_weight: 0.15,
            city_weight: 0.08,
            category_weight: 0.05,
            proximity_radius_km: 50.0,
            proximity_decay: ProximityDecay::Linear,
            max_neighbors: None,
        }
    }
}

impl GraphWeights {
    /// Sum of the four non-self bonus coefficients.
    #[must_use]
    pub fn bonus_total(&self) -> f64 {
        self.brand_weight + self.proximity_weight + self.city_weight + self.category_weight
    }

    /// Check the coefficients before any graph is built with them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("self_weight", self.self_weight),
            ("brand_weight", self.brand_weight),
            ("proximity_weight", self.proximity_weight),
            ("city_weight", self.city_weight),
            ("category_weight", self.category_weight),
            ("proximity_radius_km", self.proximity_radius_km),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "{name} must be finite, got {value}"
                )));
            }
            if value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        if self.self_weight <= 0.0 || self.self_weight > 1.0 {
            return Err(ConfigError::Validation(format!(
                "self_weight must be in (0, 1], got {}",
                self.self_weight
            )));
        }

        let bonus_total = self.bonus_total();
        if bonus_total > 1.0 + 1e-12 {
            return Err(ConfigError::Validation(format!(
                "non-self weights sum to {bonus_total}; must be <= 1"
            )));
        }

        if self.proximity_radius_km <= 0.0 {
            return Err(ConfigError::Validation(
                "proximity_radius_km must be positive".to_string(),
            ));
        }

        if self.max_neighbors == Some(0) {
            return Err(ConfigError::Validation(
                "max_neighbors must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Defaults for the forward-perturb-backward echo computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoSettings {
    pub delta: f64,
    pub horizon: usize,
    pub max_horizon: usize,
    /// Lower bound (inclusive) of the UNSTABLE class.
    pub unstable_threshold: f64,
    /// Lower bound (inclusive) of the CHAOTIC class.
    pub chaotic_threshold: f64,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            delta: 0.05,
            horizon: 4,
            max_horizon: 32,
            unstable_threshold: 1.5,
            chaotic_threshold: 3.5,
        }
    }
}

impl EchoSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if thresholds are out of order or the
    /// default horizon falls outside `1..=max_horizon`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delta.is_finite() {
            return Err(ConfigError::Validation(format!(
                "echo delta must be finite, got {}",
                self.delta
            )));
        }
        if !(self.unstable_threshold.is_finite() && self.chaotic_threshold.is_finite())
            || self.unstable_threshold <= 0.0
            || self.unstable_threshold >= self.chaotic_threshold
        {
            return Err(ConfigError::Validation(format!(
                "thresholds must satisfy 0 < unstable ({}) < chaotic ({})",
                self.unstable_threshold, self.chaotic_threshold
            )));
        }
        if self.horizon == 0 || self.horizon > self.max_horizon {
            return Err(ConfigError::Validation(format!(
                "echo horizon {} must be in 1..={}",
                self.horizon, self.max_horizon
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSettings {
    pub trials: usize,
    pub timeout_ms: u64,
    pub delta_min: f64,
    pub delta_max: f64,
    /// Trials evaluated between two timeout checks.
    pub batch_size: usize,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            trials: 1000,
            timeout_ms: 30_000,
            delta_min: 0.01,
            delta_max: 0.10,
            batch_size: 256,
        }
    }
}

impl MonteCarloSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an empty trial count, an empty
    /// batch, or an inverted perturbation range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(ConfigError::Validation(
                "monte carlo trials must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "monte carlo batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.delta_min.is_finite() && self.delta_max.is_finite())
            || self.delta_min < 0.0
            || self.delta_min > self.delta_max
        {
            return Err(ConfigError::Validation(format!(
                "monte carlo delta range [{}, {}] is invalid",
                self.delta_min, self.delta_max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalitySettings {
    /// Scopes larger than this are ranked over a seeded sample.
    pub sample_limit: usize,
    pub sample_seed: u64,
}

impl Default for CriticalitySettings {
    fn default() -> Self {
        Self {
            sample_limit: 5000,
            sample_seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSettings {
    /// Scale `k` applied to `|sentiment_trend|` for BUY confidence.
    pub trend_scale: f64,
    /// Floor for HOLD confidence.
    pub min_confidence: f64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            trend_scale: 5.0,
            min_confidence: 0.1,
        }
    }
}

impl SignalSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the scale is not positive or the
    /// floor is outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.trend_scale.is_finite() || self.trend_scale <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "signal trend_scale must be positive, got {}",
                self.trend_scale
            )));
        }
        if !(self.min_confidence > 0.0 && self.min_confidence <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "signal min_confidence must be in (0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// `0` disables result caching.
    pub ttl_secs: u64,
    /// Upper bound on cached results across all query kinds.
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 100_000,
        }
    }
}

impl CacheSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "cache max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub log_level: String,
    pub entities_path: PathBuf,
    /// Worker threads for CPU-bound work; `0` means available parallelism.
    pub worker_threads: usize,
    pub graph: GraphWeights,
    pub echo: EchoSettings,
    pub monte_carlo: MonteCarloSettings,
    pub criticality: CriticalitySettings,
    pub signal: SignalSettings,
    pub cache: CacheSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            entities_path: PathBuf::from("./config/entities.yaml"),
            worker_threads: 0,
            graph: GraphWeights::default(),
            echo: EchoSettings::default(),
            monte_carlo: MonteCarloSettings::default(),
            criticality: CriticalitySettings::default(),
            signal: SignalSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] raised by a section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate()?;
        self.echo.validate()?;
        self.monte_carlo.validate()?;
        self.signal.validate()?;
        self.cache.validate()?;
        Ok(())
    }

    /// Resolved worker count, never zero.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        }
    }
}
