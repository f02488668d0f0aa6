//! Forward-perturb-backward echo ("butterfly") computation.
//!
//! For target `i`, perturbation `δ` and horizon `T`:
//!
//! 1. `x0` is the snapshot sentiment vector.
//! 2. `xT = forward(x0, T)`.
//! 3. `x'T = xT + δ·e_i`.
//! 4. `x'0 = backward(x'T, T)`.
//! 5. `echo = ‖x'0 − x̂0‖ / √n`, where `x̂0 = backward(xT, T)` is the
//!    unperturbed round trip.
//!
//! Measuring against `x̂0` isolates what the perturbation itself brings back,
//! so a zero perturbation always yields a zero echo. By linearity
//! `x'0 − x̂0 = backward(δ·e_i, T)`, which [`EchoCalculator::magnitude`]
//! computes sparsely; [`EchoCalculator::round_trip`] runs the dense steps.

use chrono::Utc;
use scbdb_core::EchoSettings;

use crate::graph::PropagationGraph;
use crate::propagation::{PropagationOperator, Scratch};
use crate::snapshot::Snapshot;
use crate::types::{EchoContribution, EchoProfile, EchoResult, StabilityClass};

/// Dense vectors from one explicit round trip.
#[derive(Debug, Clone)]
pub struct RoundTrip {
    pub origin: Vec<f64>,
    pub evolved: Vec<f64>,
    pub baseline_origin: Vec<f64>,
    pub perturbed_origin: Vec<f64>,
}

impl RoundTrip {
    /// `x'0 − x̂0`.
    #[must_use]
    pub fn shift(&self) -> Vec<f64> {
        self.perturbed_origin
            .iter()
            .zip(&self.baseline_origin)
            .map(|(p, b)| p - b)
            .collect()
    }
}

pub struct EchoCalculator<'a> {
    snapshot: &'a Snapshot,
    graph: &'a PropagationGraph,
    settings: &'a EchoSettings,
}

impl<'a> EchoCalculator<'a> {
    #[must_use]
    pub fn new(
        snapshot: &'a Snapshot,
        graph: &'a PropagationGraph,
        settings: &'a EchoSettings,
    ) -> Self {
        debug_assert_eq!(snapshot.len(), graph.len());
        Self {
            snapshot,
            graph,
            settings,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        self.snapshot
    }

    #[must_use]
    pub fn settings(&self) -> &EchoSettings {
        self.settings
    }

    #[must_use]
    pub fn classify(&self, magnitude: f64) -> StabilityClass {
        StabilityClass::from_magnitude(
            magnitude,
            self.settings.unstable_threshold,
            self.settings.chaotic_threshold,
        )
    }

    /// Echo magnitude for entity `idx`. Zero for graphs of 0 or 1 entities.
    pub fn magnitude(&self, idx: usize, delta: f64, horizon: usize, scratch: &mut Scratch) -> f64 {
        let n = self.graph.len();
        if n <= 1 || delta == 0.0 {
            return 0.0;
        }
        let op = PropagationOperator::new(self.graph);
        let shift = op.backward_sparse(&[(idx, delta)], horizon, scratch);
        let norm = shift.iter().map(|&(_, v)| v * v).sum::<f64>().sqrt();
        #[allow(clippy::cast_precision_loss)]
        let scale = (n as f64).sqrt();
        norm / scale
    }

    pub fn evaluate(
        &self,
        idx: usize,
        delta: f64,
        horizon: usize,
        scratch: &mut Scratch,
    ) -> EchoResult {
        let echo_magnitude = self.magnitude(idx, delta, horizon, scratch);
        EchoResult {
            entity_id: self.snapshot.entity(idx).entity_id.clone(),
            echo_magnitude,
            stability_class: self.classify(echo_magnitude),
            computed_at: Utc::now(),
            snapshot_version: self.snapshot.version(),
        }
    }

    /// Run the five steps densely over the whole graph.
    #[must_use]
    pub fn round_trip(&self, idx: usize, delta: f64, horizon: usize) -> RoundTrip {
        let op = PropagationOperator::new(self.graph);
        let origin = self.snapshot.sentiment_vector();
        let evolved = op.forward(&origin, horizon);

        let mut perturbed = evolved.clone();
        perturbed[idx] += delta;

        let baseline_origin = op.backward(&evolved, horizon);
        let perturbed_origin = op.backward(&perturbed, horizon);

        RoundTrip {
            origin,
            evolved,
            baseline_origin,
            perturbed_origin,
        }
    }

    /// Echo plus the `limit` entities whose reconstructed origin moved most.
    #[must_use]
    pub fn profile(&self, idx: usize, delta: f64, horizon: usize, limit: usize) -> EchoProfile {
        let trip = self.round_trip(idx, delta, horizon);
        let shift = trip.shift();

        let n = shift.len();
        let echo_magnitude = if n <= 1 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let scale = (n as f64).sqrt();
            shift.iter().map(|v| v * v).sum::<f64>().sqrt() / scale
        };

        let mut ranked: Vec<(usize, f64)> = shift
            .into_iter()
            .enumerate()
            .filter(|&(_, v)| v != 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);

        EchoProfile {
            echo: EchoResult {
                entity_id: self.snapshot.entity(idx).entity_id.clone(),
                echo_magnitude,
                stability_class: self.classify(echo_magnitude),
                computed_at: Utc::now(),
                snapshot_version: self.snapshot.version(),
            },
            delta,
            horizon,
            contributions: ranked
                .into_iter()
                .map(|(j, shift)| EchoContribution {
                    entity_id: self.snapshot.entity(j).entity_id.clone(),
                    shift,
                })
                .collect(),
        }
    }
}
