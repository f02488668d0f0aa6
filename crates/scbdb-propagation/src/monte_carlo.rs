//! Monte Carlo distribution of echo magnitudes under random perturbations.
//!
//! The full trial plan (target, delta) is drawn up front from a seeded RNG,
//! then evaluated batch by batch on the current rayon pool. Results are
//! collected in plan order, so a seed reproduces the run bit for bit regardless
//! of the pool's thread count. The timeout is checked after each batch; a run that
//! runs out of time reports the completed prefix with `partial = true`.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use scbdb_core::MonteCarloSettings;

use crate::echo::EchoCalculator;
use crate::propagation::Scratch;
use crate::types::{ClassCounts, MonteCarloReport, Scope};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Trial {
    target: usize,
    delta: f64,
}

pub struct MonteCarloSimulator<'a> {
    calc: &'a EchoCalculator<'a>,
    settings: &'a MonteCarloSettings,
}

impl<'a> MonteCarloSimulator<'a> {
    #[must_use]
    pub fn new(calc: &'a EchoCalculator<'a>, settings: &'a MonteCarloSettings) -> Self {
        Self { calc, settings }
    }

    /// Run `trials` perturbations over `targets` (non-empty entity indices).
    #[must_use]
    pub fn run(
        &self,
        scope: Scope,
        targets: &[usize],
        trials: usize,
        seed: u64,
        horizon: usize,
    ) -> MonteCarloReport {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.settings.timeout_ms);
        let plan = self.plan(targets, trials, seed);

        let mut magnitudes: Vec<f64> = Vec::with_capacity(plan.len());
        let mut partial = false;
        let batch_size = self.settings.batch_size.max(1);

        for batch in plan.chunks(batch_size) {
            let results: Vec<f64> = batch
                .par_iter()
                .map_init(Scratch::new, |scratch, trial| {
                    self.calc
                        .magnitude(trial.target, trial.delta, horizon, scratch)
                })
                .collect();
            magnitudes.extend(results);

            if magnitudes.len() < plan.len() && started.elapsed() >= timeout {
                partial = true;
                tracing::warn!(
                    scope = %scope,
                    trials_requested = trials,
                    trials_completed = magnitudes.len(),
                    timeout_ms = self.settings.timeout_ms,
                    "monte carlo run timed out; returning partial aggregate"
                );
                break;
            }
        }

        let mut class_counts = ClassCounts::default();
        for &m in &magnitudes {
            class_counts.record(self.calc.classify(m));
        }
        let stats = Summary::of(&magnitudes);

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;

        MonteCarloReport {
            scope,
            snapshot_version: self.calc.snapshot().version(),
            seed,
            trials_requested: trials,
            trials_completed: magnitudes.len(),
            partial,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
            p50: stats.p50,
            p90: stats.p90,
            p99: stats.p99,
            class_counts,
            elapsed_ms,
        }
    }

    fn plan(&self, targets: &[usize], trials: usize, seed: u64) -> Vec<Trial> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (lo, hi) = (self.settings.delta_min, self.settings.delta_max);
        (0..trials)
            .map(|_| {
                let target = targets[rng.random_range(0..targets.len())];
                let delta = if hi > lo {
                    rng.random_range(lo..=hi)
                } else {
                    lo
                };
                Trial { target, delta }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Summary {
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
    p50: f64,
    p90: f64,
    p99: f64,
}

impl Summary {
    /// Population statistics; all zero for an empty sample.
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: nearest_rank(&sorted, 50.0),
            p90: nearest_rank(&sorted, 90.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use scbdb_core::{EchoSettings, GraphWeights};

    use super::*;
    use crate::graph::PropagationGraph;
    use crate::snapshot::Snapshot;
    use crate::test_support::{chain, snapshot_of};

    fn fixture() -> (Snapshot, PropagationGraph) {
        let snap = snapshot_of(chain(60));
        let graph = PropagationGraph::build(&snap, &GraphWeights::default());
        (snap, graph)
    }

    #[test]
    fn same_seed_is_bit_identical_across_pool_sizes() {
        let (snap, graph) = fixture();
        let echo = EchoSettings::default();
        let calc = EchoCalculator::new(&snap, &graph, &echo);
        let settings = MonteCarloSettings {
            batch_size: 17,
            ..MonteCarloSettings::default()
        };
        let targets: Vec<usize> = (0..snap.len()).collect();

        let run_on = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .expect("thread pool")
                .install(|| {
                    MonteCarloSimulator::new(&calc, &settings).run(Scope::All, &targets, 300, 42, 4)
                })
        };
        let one = run_on(1);
        let many = run_on(6);

        assert_eq!(one.mean.to_bits(), many.mean.to_bits());
        assert_eq!(one.std_dev.to_bits(), many.std_dev.to_bits());
        assert_eq!(one.p90.to_bits(), many.p90.to_bits());
        assert_eq!(one.p99.to_bits(), many.p99.to_bits());
        assert_eq!(one.class_counts, many.class_counts);
        assert_eq!(one.trials_completed, 300);
        assert!(!one.partial);
    }

    #[test]
    fn different_seeds_differ() {
        let (snap, graph) = fixture();
        let echo = EchoSettings::default();
        let calc = EchoCalculator::new(&snap, &graph, &echo);
        let settings = MonteCarloSettings::default();
        let targets: Vec<usize> = (0..snap.len()).collect();
        let sim = MonteCarloSimulator::new(&calc, &settings);
        let a = sim.run(Scope::All, &targets, 200, 1, 4);
        let b = sim.run(Scope::All, &targets, 200, 2, 4);
        assert_ne!(a.mean.to_bits(), b.mean.to_bits());
    }

    #[test]
    fn zero_timeout_returns_flagged_partial_prefix() {
        let (snap, graph) = fixture();
        let echo = EchoSettings::default();
        let calc = EchoCalculator::new(&snap, &graph, &echo);
        let settings = MonteCarloSettings {
            timeout_ms: 0,
            batch_size: 5,
            ..MonteCarloSettings::default()
        };
        let targets: Vec<usize> = (0..snap.len()).collect();
        let report =
            MonteCarloSimulator::new(&calc, &settings).run(Scope::All, &targets, 100, 9, 4);
        assert!(report.partial);
        assert_eq!(report.trials_completed, 5);
        assert_eq!(report.trials_requested, 100);
        assert!(report.mean > 0.0);
    }

    #[test]
    fn stats_are_ordered() {
        let (snap, graph) = fixture();
        let echo = EchoSettings::default();
        let calc = EchoCalculator::new(&snap, &graph, &echo);
        let settings = MonteCarloSettings::default();
        let targets: Vec<usize> = (0..10).collect();
        let report =
            MonteCarloSimulator::new(&calc, &settings).run(Scope::All, &targets, 250, 7, 4);
        assert!(report.min <= report.p50);
        assert!(report.p50 <= report.p90);
        assert!(report.p90 <= report.p99);
        assert!(report.p99 <= report.max);
        assert!(report.std_dev >= 0.0);
        assert_eq!(
            report.class_counts.stable + report.class_counts.unstable + report.class_counts.chaotic,
            250
        );
    }

    #[test]
    fn fixed_delta_range_is_honored() {
        let (snap, graph) = fixture();
        let echo = EchoSettings::default();
        let calc = EchoCalculator::new(&snap, &graph, &echo);
        let settings = MonteCarloSettings {
            delta_min: 0.0,
            delta_max: 0.0,
            ..MonteCarloSettings::default()
        };
        let targets: Vec<usize> = (0..snap.len()).collect();
        let report =
            MonteCarloSimulator::new(&calc, &settings).run(Scope::All, &targets, 50, 3, 4);
        assert!(report.max.abs() < f64::EPSILON);
        assert_eq!(report.class_counts.stable, 50);
    }

    #[test]
    fn summary_of_known_values() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let s = Summary::of(&values);
        assert!((s.mean - 50.5).abs() < 1e-12);
        assert!((s.p50 - 50.0).abs() < f64::EPSILON);
        assert!((s.p90 - 90.0).abs() < f64::EPSILON);
        assert!((s.p99 - 99.0).abs() < f64::EPSILON);
        assert!((s.min - 1.0).abs() < f64::EPSILON);
        assert!((s.max - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_of_empty_is_zero() {
        assert_eq!(Summary::of(&[]), Summary::default());
    }
}
