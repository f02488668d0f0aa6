//! Immutable, versioned view of every tracked entity.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use scbdb_core::{validate_entities, ConfigError, EntityState};

use crate::error::EngineError;
use crate::types::Scope;

#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    built_at: DateTime<Utc>,
    entities: Vec<EntityState>,
    index: HashMap<String, usize>,
    brand_count: usize,
    city_count: usize,
}

impl Snapshot {
    /// The snapshot an engine starts with before its first rebuild.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            built_at: Utc::now(),
            entities: Vec::new(),
            index: HashMap::new(),
            brand_count: 0,
            city_count: 0,
        }
    }

    /// Validate `entities` and freeze them under `version`.
    ///
    /// Entities are stored sorted by `entity_id`, so indices (and everything
    /// derived from them) do not depend on input order. `active_version` is
    /// only used to annotate errors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSnapshot`] for a duplicate id, an empty
    /// brand, an out-of-bounds score, or malformed coordinates.
    pub fn build(
        version: u64,
        mut entities: Vec<EntityState>,
        active_version: u64,
    ) -> Result<Self, EngineError> {
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        let mut index = HashMap::with_capacity(entities.len());
        let mut brands = HashSet::new();
        let mut cities = HashSet::new();

        for (i, entity) in entities.iter().enumerate() {
            validate_entities(std::slice::from_ref(entity)).map_err(|e| {
                let reason = match e {
                    ConfigError::Validation(msg) => msg,
                    other => other.to_string(),
                };
                EngineError::InvalidSnapshot {
                    entity_id: entity.entity_id.clone(),
                    reason,
                    snapshot_version: active_version,
                }
            })?;

            if index.insert(entity.entity_id.clone(), i).is_some() {
                return Err(EngineError::InvalidSnapshot {
                    entity_id: entity.entity_id.clone(),
                    reason: "duplicate entity_id".to_string(),
                    snapshot_version: active_version,
                });
            }

            brands.insert(entity.brand_id.as_str());
            let city = entity.city_key();
            if !city.is_empty() {
                cities.insert(city);
            }
        }

        let brand_count = brands.len();
        let city_count = cities.len();

        Ok(Self {
            version,
            built_at: Utc::now(),
            entities,
            index,
            brand_count,
            city_count,
        })
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn entities(&self) -> &[EntityState] {
        &self.entities
    }

    #[must_use]
    pub fn entity(&self, idx: usize) -> &EntityState {
        &self.entities[idx]
    }

    #[must_use]
    pub fn index_of(&self, entity_id: &str) -> Option<usize> {
        self.index.get(entity_id).copied()
    }

    /// Look up an entity index or fail with `UnknownEntity`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownEntity`] when the id is absent.
    pub fn require(&self, entity_id: &str) -> Result<usize, EngineError> {
        self.index_of(entity_id)
            .ok_or_else(|| EngineError::UnknownEntity {
                entity_id: entity_id.to_string(),
                snapshot_version: self.version,
            })
    }

    #[must_use]
    pub fn brand_count(&self) -> usize {
        self.brand_count
    }

    #[must_use]
    pub fn city_count(&self) -> usize {
        self.city_count
    }

    /// Current sentiment vector `x0`, indexed like the graph.
    #[must_use]
    pub fn sentiment_vector(&self) -> Vec<f64> {
        self.entities.iter().map(|e| e.sentiment_score).collect()
    }

    /// Entity indices covered by `scope`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidScope`] when nothing matches.
    pub fn resolve_scope(&self, scope: &Scope) -> Result<Vec<usize>, EngineError> {
        let indices: Vec<usize> = match scope {
            Scope::All => (0..self.entities.len()).collect(),
            Scope::Entity(id) => self.index_of(id).into_iter().collect(),
            Scope::Brand(brand) => self
                .entities
                .iter()
                .enumerate()
                .filter(|(_, e)| e.brand_id == *brand)
                .map(|(i, _)| i)
                .collect(),
            Scope::City(city) => {
                let wanted = city.trim().to_lowercase();
                self.entities
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| !wanted.is_empty() && e.city.trim().to_lowercase() == wanted)
                    .map(|(i, _)| i)
                    .collect()
            }
        };

        if indices.is_empty() {
            return Err(EngineError::InvalidScope {
                scope: scope.to_string(),
                snapshot_version: self.version,
            });
        }
        Ok(indices)
    }
}
