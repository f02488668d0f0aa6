//! Ranking of entities by how far a local perturbation echoes.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use scbdb_core::CriticalitySettings;

use crate::echo::EchoCalculator;
use crate::propagation::Scratch;
use crate::types::EchoResult;

pub struct CriticalityRanker<'a> {
    calc: &'a EchoCalculator<'a>,
    settings: &'a CriticalitySettings,
}

impl<'a> CriticalityRanker<'a> {
    #[must_use]
    pub fn new(calc: &'a EchoCalculator<'a>, settings: &'a CriticalitySettings) -> Self {
        Self { calc, settings }
    }

    /// Top `top_k` of `candidates` by echo magnitude, descending, ties by
    /// entity id ascending. `top_k` is clamped to the number evaluated.
    ///
    /// Candidate sets larger than `sample_limit` are ranked over a seeded
    /// sample of that size.
    #[must_use]
    pub fn rank(
        &self,
        candidates: &[usize],
        top_k: usize,
        delta: f64,
        horizon: usize,
    ) -> Vec<EchoResult> {
        let evaluated = self.sample(candidates);
        let mut results: Vec<EchoResult> = evaluated
            .par_iter()
            .map_init(Scratch::new, |scratch, &idx| {
                self.calc.evaluate(idx, delta, horizon, scratch)
            })
            .collect();

        results.sort_by(|a, b| {
            b.echo_magnitude
                .total_cmp(&a.echo_magnitude)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        results.truncate(top_k.min(evaluated.len()));
        results
    }

    fn sample(&self, candidates: &[usize]) -> Vec<usize> {
        let limit = self.settings.sample_limit;
        if limit == 0 || candidates.len() <= limit {
            return candidates.to_vec();
        }
        tracing::debug!(
            candidates = candidates.len(),
            sample_limit = limit,
            "criticality: ranking over a sample"
        );
        let mut rng = StdRng::seed_from_u64(self.settings.sample_seed);
        let mut picked: Vec<usize> = rand::seq::index::sample(&mut rng, candidates.len(), limit)
            .into_iter()
            .map(|pos| candidates[pos])
            .collect();
        picked.sort_unstable();
        picked
    }
}
