//! Row-stochastic propagation operator built from a [`Snapshot`].
//!
//! Each row keeps `self_weight` of its mass on the entity itself and spreads
//! the rest over neighbors in proportion to their bonus sum (brand, proximity,
//! city, category). Rows are stored as CSR over entity indices.

use std::collections::HashMap;

use rayon::prelude::*;
use scbdb_core::{Coordinates, GraphWeights, ProximityDecay};

use crate::geo::{haversine_km, GeoIndex};
use crate::snapshot::Snapshot;

/// Tolerance for the row-sum invariant.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Steepness of the exponential proximity falloff.
const EXP_DECAY_RATE: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct PropagationGraph {
    snapshot_version: u64,
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    weights: Vec<f64>,
    entity_ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl PropagationGraph {
    /// Build the operator for `snapshot`, one row per rayon task.
    ///
    /// Rows are computed on the current rayon pool; the result does not depend
    /// on its thread count.
    #[must_use]
    pub fn build(snapshot: &Snapshot, weights: &GraphWeights) -> Self {
        let ctx = BuildContext::new(snapshot, weights);
        let rows: Vec<Vec<(usize, f64)>> = (0..snapshot.len())
            .into_par_iter()
            .map(|i| ctx.row(i))
            .collect();

        let nnz = rows.iter().map(Vec::len).sum();
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut cols = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for row in rows {
            for (j, w) in row {
                cols.push(j);
                values.push(w);
            }
            row_ptr.push(cols.len());
        }

        let entity_ids: Vec<String> = snapshot
            .entities()
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();
        let index = entity_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Self {
            snapshot_version: snapshot.version(),
            row_ptr,
            cols,
            weights: values,
            entity_ids,
            index,
        }
    }

    #[must_use]
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    /// Number of entities (rows).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    /// Stored entries, self-weights included.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    /// Directed non-self edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        (0..self.len())
            .map(|i| self.row(i).0.iter().filter(|&&j| j != i).count())
            .sum()
    }

    /// Column indices and weights of row `i`, columns ascending.
    #[must_use]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.cols[range.clone()], &self.weights[range])
    }

    /// Weight of the `i -> j` entry, zero when absent.
    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        let (cols, weights) = self.row(i);
        cols.binary_search(&j).map_or(0.0, |pos| weights[pos])
    }

    #[must_use]
    pub fn entity_id(&self, i: usize) -> &str {
        &self.entity_ids[i]
    }

    #[must_use]
    pub fn index_of(&self, entity_id: &str) -> Option<usize> {
        self.index.get(entity_id).copied()
    }

    /// Check every row is non-empty, finite, non-negative and sums to 1.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending row.
    pub fn check_row_stochastic(&self) -> Result<(), String> {
        for i in 0..self.len() {
            let (cols, weights) = self.row(i);
            if cols.is_empty() {
                return Err(format!("row for '{}' is empty", self.entity_ids[i]));
            }
            if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(format!(
                    "row for '{}' has invalid weight {w}",
                    self.entity_ids[i]
                ));
            }
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(format!(
                    "row for '{}' sums to {sum}",
                    self.entity_ids[i]
                ));
            }
        }
        Ok(())
    }
}

/// Per-build lookup tables shared read-only across row tasks.
struct BuildContext<'a> {
    snapshot: &'a Snapshot,
    weights: &'a GraphWeights,
    coords: Vec<Option<Coordinates>>,
    city_keys: Vec<String>,
    category_keys: Vec<String>,
    by_brand: HashMap<&'a str, Vec<usize>>,
    by_city: HashMap<String, Vec<usize>>,
    geo: GeoIndex,
}

impl<'a> BuildContext<'a> {
    fn new(snapshot: &'a Snapshot, weights: &'a GraphWeights) -> Self {
        let entities = snapshot.entities();
        let coords: Vec<Option<Coordinates>> = entities.iter().map(|e| e.coordinates()).collect();
        let city_keys: Vec<String> = entities.iter().map(|e| e.city_key()).collect();
        let category_keys = entities.iter().map(|e| e.category_key()).collect();

        let mut by_brand: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_city: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, e) in entities.iter().enumerate() {
            by_brand.entry(e.brand_id.as_str()).or_default().push(i);
            if !city_keys[i].is_empty() {
                by_city.entry(city_keys[i].clone()).or_default().push(i);
            }
        }

        let geo = GeoIndex::new(
            coords
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.map(|c| (i, c))),
            weights.proximity_radius_km,
        );

        Self {
            snapshot,
            weights,
            coords,
            city_keys,
            category_keys,
            by_brand,
            by_city,
            geo,
        }
    }

    /// Entities sharing a brand or city with `i`, or within the radius.
    fn candidates(&self, i: usize) -> Vec<usize> {
        let entity = self.snapshot.entity(i);
        let mut out = Vec::new();
        if self.weights.brand_weight > 0.0 {
            if let Some(members) = self.by_brand.get(entity.brand_id.as_str()) {
                out.extend_from_slice(members);
            }
        }
        if self.weights.city_weight > 0.0 && !self.city_keys[i].is_empty() {
            if let Some(members) = self.by_city.get(&self.city_keys[i]) {
                out.extend_from_slice(members);
            }
        }
        if self.weights.proximity_weight > 0.0 {
            if let Some(origin) = self.coords[i] {
                self.geo
                    .candidates(origin, self.weights.proximity_radius_km, &mut out);
            }
        }
        out.sort_unstable();
        out.dedup();
        out.retain(|&j| j != i);
        out
    }

    /// Unnormalized bonus sum for the pair `(i, j)`.
    fn pair_weight(&self, i: usize, j: usize) -> f64 {
        let a = self.snapshot.entity(i);
        let b = self.snapshot.entity(j);
        let w = self.weights;

        let mut total = 0.0;
        if a.brand_id == b.brand_id {
            total += w.brand_weight;
        }
        if let (Some(ca), Some(cb)) = (self.coords[i], self.coords[j]) {
            let d = haversine_km(ca, cb);
            if d < w.proximity_radius_km {
                total += w.proximity_weight
                    * proximity_falloff(d, w.proximity_radius_km, w.proximity_decay);
            }
        }
        if !self.city_keys[i].is_empty() && self.city_keys[i] == self.city_keys[j] {
            total += w.city_weight;
        }
        // Category only strengthens a relation that already exists.
        if total > 0.0
            && !self.category_keys[i].is_empty()
            && self.category_keys[i] == self.category_keys[j]
        {
            total += w.category_weight;
        }
        total
    }

    fn row(&self, i: usize) -> Vec<(usize, f64)> {
        let self_weight = self.weights.self_weight;
        let spread = 1.0 - self_weight;

        let mut neighbors: Vec<(usize, f64)> = self
            .candidates(i)
            .into_iter()
            .map(|j| (j, self.pair_weight(i, j)))
            .filter(|&(_, w)| w > 0.0)
            .collect();

        if neighbors.is_empty() || spread <= 0.0 {
            return vec![(i, 1.0)];
        }

        // Snapshot indices follow entity id order, so equal weights are cut
        // by id regardless of how the entities were supplied.
        if let Some(cap) = self.weights.max_neighbors {
            if neighbors.len() > cap {
                neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                neighbors.truncate(cap);
            }
        }

        let bonus_sum: f64 = neighbors.iter().map(|&(_, w)| w).sum();
        let mut row: Vec<(usize, f64)> = Vec::with_capacity(neighbors.len() + 1);
        row.push((i, self_weight));
        row.extend(
            neighbors
                .into_iter()
                .map(|(j, w)| (j, spread * w / bonus_sum)),
        );

        let row_sum: f64 = row.iter().map(|&(_, w)| w).sum();
        for entry in &mut row {
            entry.1 /= row_sum;
        }
        row.sort_unstable_by_key(|&(j, _)| j);
        row
    }
}

/// Fraction of the proximity bonus kept at distance `d`; zero at `radius`.
#[must_use]
pub fn proximity_falloff(d: f64, radius: f64, decay: ProximityDecay) -> f64 {
    if d >= radius {
        return 0.0;
    }
    let x = (d / radius).max(0.0);
    match decay {
        ProximityDecay::Linear => 1.0 - x,
        ProximityDecay::Exponential => {
            let floor = (-EXP_DECAY_RATE).exp();
            ((-EXP_DECAY_RATE * x).exp() - floor) / (1.0 - floor)
        }
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
