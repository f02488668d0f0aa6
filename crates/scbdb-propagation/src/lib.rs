//! Sentiment propagation engine for SCBDB.
//!
//! Builds a sparse, row-stochastic influence graph over tracked entities
//! (brand, proximity, city and category ties), propagates sentiment forward
//! and backward through it, and measures how far a small perturbation echoes
//! back. On top of that sit Monte Carlo risk runs, criticality ranking and
//! BUY/HOLD/SELL signals. [`PropagationEngine`] owns the active
//! snapshot/graph pair and swaps it atomically on rebuild.

pub mod cache;
pub mod criticality;
pub mod echo;
pub mod engine;
pub mod error;
pub mod graph;
pub mod monte_carlo;
pub mod propagation;
pub mod signal;
pub mod snapshot;
pub mod types;

mod geo;

#[cfg(test)]
mod test_support;

pub use engine::{ActiveGraph, PropagationEngine};
pub use error::EngineError;
pub use geo::haversine_km;
pub use graph::PropagationGraph;
pub use snapshot::Snapshot;
pub use types::{
    ClassCounts, EchoContribution, EchoProfile, EchoResult, HealthReport, MonteCarloReport, Scope,
    Signal, SignalRationale, StabilityClass, TradingSignal,
};
