use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket derived from an echo magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StabilityClass {
    Stable,
    Unstable,
    Chaotic,
}

impl StabilityClass {
    /// Classify a magnitude. Both lower bounds are inclusive.
    #[must_use]
    pub fn from_magnitude(magnitude: f64, unstable_threshold: f64, chaotic_threshold: f64) -> Self {
        if magnitude >= chaotic_threshold {
            StabilityClass::Chaotic
        } else if magnitude >= unstable_threshold {
            StabilityClass::Unstable
        } else {
            StabilityClass::Stable
        }
    }
}

impl std::fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StabilityClass::Stable => write!(f, "STABLE"),
            StabilityClass::Unstable => write!(f, "UNSTABLE"),
            StabilityClass::Chaotic => write!(f, "CHAOTIC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResult {
    pub entity_id: String,
    pub echo_magnitude: f64,
    pub stability_class: StabilityClass,
    pub computed_at: DateTime<Utc>,
    pub snapshot_version: u64,
}

/// One entity's share of an echo's round-trip footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoContribution {
    pub entity_id: String,
    /// Signed shift of the reconstructed origin state for this entity.
    pub shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoProfile {
    pub echo: EchoResult,
    pub delta: f64,
    pub horizon: usize,
    /// Largest absolute shifts first.
    pub contributions: Vec<EchoContribution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Hold => write!(f, "HOLD"),
            Signal::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRationale {
    pub sentiment_trend: f64,
    pub echo_magnitude: f64,
    pub stability_class: StabilityClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub entity_id: String,
    pub signal: Signal,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub rationale: SignalRationale,
    pub snapshot_version: u64,
}

/// Subset of the snapshot an aggregate query runs over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Scope {
    Entity(String),
    Brand(String),
    City(String),
    All,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Entity(id) => write!(f, "entity:{id}"),
            Scope::Brand(id) => write!(f, "brand:{id}"),
            Scope::City(name) => write!(f, "city:{name}"),
            Scope::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub stable: usize,
    pub unstable: usize,
    pub chaotic: usize,
}

impl ClassCounts {
    pub(crate) fn record(&mut self, class: StabilityClass) {
        match class {
            StabilityClass::Stable => self.stable += 1,
            StabilityClass::Unstable => self.unstable += 1,
            StabilityClass::Chaotic => self.chaotic += 1,
        }
    }
}

/// Aggregate statistics over Monte Carlo echo trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub scope: Scope,
    pub snapshot_version: u64,
    /// Seed actually used; replaying with it reproduces the run exactly.
    pub seed: u64,
    pub trials_requested: usize,
    pub trials_completed: usize,
    /// `true` when the run hit its timeout before finishing every trial.
    pub partial: bool,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub class_counts: ClassCounts,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub snapshot_version: u64,
    pub entity_count: usize,
    pub brand_count: usize,
    pub city_count: usize,
    pub edge_count: usize,
    /// Hits over lookups since start; `0.0` before the first lookup.
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub rebuild_in_progress: bool,
    pub last_rebuild_at: Option<DateTime<Utc>>,
}
