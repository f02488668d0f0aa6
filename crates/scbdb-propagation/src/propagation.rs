//! Forward and adjoint application of a [`PropagationGraph`].
//!
//! `forward` computes `x <- W x` per step, so each entity moves toward the
//! weighted average of its row. `backward` applies the transpose `x <- Wᵀ x`,
//! scattering each entity's value back along the edges that fed it. `W` is a
//! contraction and not invertible in general; the transpose stands in for the
//! inverse.

use crate::graph::PropagationGraph;

#[derive(Debug, Clone, Copy)]
pub struct PropagationOperator<'g> {
    graph: &'g PropagationGraph,
}

impl<'g> PropagationOperator<'g> {
    #[must_use]
    pub fn new(graph: &'g PropagationGraph) -> Self {
        Self { graph }
    }

    /// Apply `W` to `x` `steps` times.
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from the graph size.
    #[must_use]
    pub fn forward(&self, x: &[f64], steps: usize) -> Vec<f64> {
        assert_eq!(x.len(), self.graph.len(), "vector/graph size mismatch");
        let mut current = x.to_vec();
        let mut next = vec![0.0; current.len()];
        for _ in 0..steps {
            for (i, out) in next.iter_mut().enumerate() {
                let (cols, weights) = self.graph.row(i);
                *out = cols
                    .iter()
                    .zip(weights)
                    .map(|(&j, &w)| w * current[j])
                    .sum();
            }
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    /// Apply `Wᵀ` to `x` `steps` times.
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from the graph size.
    #[must_use]
    pub fn backward(&self, x: &[f64], steps: usize) -> Vec<f64> {
        assert_eq!(x.len(), self.graph.len(), "vector/graph size mismatch");
        let mut current = x.to_vec();
        let mut next = vec![0.0; current.len()];
        for _ in 0..steps {
            next.fill(0.0);
            for (i, &value) in current.iter().enumerate() {
                if value == 0.0 {
                    continue;
                }
                let (cols, weights) = self.graph.row(i);
                for (&j, &w) in cols.iter().zip(weights) {
                    next[j] += w * value;
                }
            }
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    /// Apply `Wᵀ` to a sparse vector, touching only reachable entries.
    ///
    /// Equivalent to [`backward`](Self::backward) on the densified input,
    /// but costs proportional to the neighborhood reached in `steps` hops
    /// rather than to the whole graph. Output entries are in first-touch order.
    pub fn backward_sparse(
        &self,
        seed: &[(usize, f64)],
        steps: usize,
        scratch: &mut Scratch,
    ) -> Vec<(usize, f64)> {
        scratch.ensure(self.graph.len());
        let mut current: Vec<(usize, f64)> = seed.to_vec();
        for _ in 0..steps {
            for &(i, value) in &current {
                if value == 0.0 {
                    continue;
                }
                let (cols, weights) = self.graph.row(i);
                for (&j, &w) in cols.iter().zip(weights) {
                    scratch.add(j, w * value);
                }
            }
            current = scratch.drain();
        }
        current
    }
}

/// Reusable dense accumulator for [`PropagationOperator::backward_sparse`].
#[derive(Debug, Default)]
pub struct Scratch {
    acc: Vec<f64>,
    touched: Vec<usize>,
    seen: Vec<bool>,
}

impl Scratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, n: usize) {
        if self.acc.len() != n {
            self.acc = vec![0.0; n];
            self.seen = vec![false; n];
            self.touched.clear();
        }
    }

    fn add(&mut self, j: usize, value: f64) {
        if !self.seen[j] {
            self.seen[j] = true;
            self.touched.push(j);
        }
        self.acc[j] += value;
    }

    fn drain(&mut self) -> Vec<(usize, f64)> {
        let mut out = Vec::with_capacity(self.touched.len());
        for j in self.touched.drain(..) {
            out.push((j, self.acc[j]));
            self.acc[j] = 0.0;
            self.seen[j] = false;
        }
        out
    }
}
