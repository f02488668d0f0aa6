use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Inclusive bounds of `sentiment_score`.
pub const SENTIMENT_MIN: f64 = -1.0;
pub const SENTIMENT_MAX: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Current sentiment state of one tracked location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub brand_id: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub sentiment_score: f64,
    #[serde(default)]
    pub sentiment_trend: f64,
    #[serde(default)]
    pub observation_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    /// Coordinates, only when both halves are present.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Normalized city key used for same-city matching. Empty when unknown.
    #[must_use]
    pub fn city_key(&self) -> String {
        let city = self.city.trim().to_lowercase();
        if city.is_empty() {
            return city;
        }
        let country = self.country.trim().to_lowercase();
        format!("{country}/{city}")
    }

    /// Normalized category key. Empty when unknown.
    #[must_use]
    pub fn category_key(&self) -> String {
        self.category.trim().to_lowercase()
    }

    /// Ingestion helper: clamp the score into `[SENTIMENT_MIN, SENTIMENT_MAX]`.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.sentiment_score = self.sentiment_score.clamp(SENTIMENT_MIN, SENTIMENT_MAX);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct EntitiesFile {
    pub entities: Vec<EntityState>,
}

/// Load and validate entity states from a YAML (or JSON) file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_entities(path: &Path) -> Result<EntitiesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::EntitiesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let entities_file: EntitiesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::EntitiesFileParse)?;

    validate_entities(&entities_file.entities)?;

    Ok(entities_file)
}

/// Check the per-row invariants every snapshot relies on.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first bad entity.
pub fn validate_entities(entities: &[EntityState]) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for entity in entities {
        if entity.entity_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "entity_id must be non-empty".to_string(),
            ));
        }

        if !seen_ids.insert(entity.entity_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate entity_id: '{}'",
                entity.entity_id
            )));
        }

        if entity.brand_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "entity '{}' has an empty brand_id",
                entity.entity_id
            )));
        }

        if !entity.sentiment_score.is_finite()
            || !(SENTIMENT_MIN..=SENTIMENT_MAX).contains(&entity.sentiment_score)
        {
            return Err(ConfigError::Validation(format!(
                "entity '{}' has sentiment_score {} outside [{SENTIMENT_MIN}, {SENTIMENT_MAX}]",
                entity.entity_id, entity.sentiment_score
            )));
        }

        if !entity.sentiment_trend.is_finite() {
            return Err(ConfigError::Validation(format!(
                "entity '{}' has a non-finite sentiment_trend",
                entity.entity_id
            )));
        }

        if let Some(coords) = entity.coordinates() {
            if !coords.is_valid() {
                return Err(ConfigError::Validation(format!(
                    "entity '{}' has invalid coordinates ({}, {})",
                    entity.entity_id, coords.latitude, coords.longitude
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "entities_test.rs"]
mod tests;
