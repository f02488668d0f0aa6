//! Fixtures shared by unit tests.

use chrono::Utc;
use scbdb_core::EntityState;

use crate::snapshot::Snapshot;

pub(crate) fn entity(id: &str, brand: &str, city: &str) -> EntityState {
    EntityState {
        entity_id: id.to_string(),
        brand_id: brand.to_string(),
        city: city.to_string(),
        country: "US".to_string(),
        latitude: None,
        longitude: None,
        category: String::new(),
        sentiment_score: 0.0,
        sentiment_trend: 0.0,
        observation_count: 1,
        last_updated: Utc::now(),
    }
}

pub(crate) fn located(mut e: EntityState, latitude: f64, longitude: f64) -> EntityState {
    e.latitude = Some(latitude);
    e.longitude = Some(longitude);
    e
}

pub(crate) fn scored(mut e: EntityState, score: f64, trend: f64) -> EntityState {
    e.sentiment_score = score;
    e.sentiment_trend = trend;
    e
}

/// A and B share brand X and city P a few km apart; C is brand Y in city Q,
/// on another continent.
pub(crate) fn three_entities() -> Vec<EntityState> {
    vec![
        scored(located(entity("A", "X", "P"), 32.78, -79.93), 0.8, 0.1),
        scored(located(entity("B", "X", "P"), 32.80, -79.90), 0.7, 0.05),
        scored(located(entity("C", "Y", "Q"), 48.85, 2.35), -0.6, -0.2),
    ]
}

pub(crate) fn snapshot_of(entities: Vec<EntityState>) -> Snapshot {
    Snapshot::build(1, entities, 0).expect("fixture snapshot must be valid")
}

/// A brand chain spread along a line plus unrelated singletons, `n` total.
pub(crate) fn chain(n: usize) -> Vec<EntityState> {
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f64 * 0.05;
            let brand = if i % 4 == 3 { format!("solo-{i}") } else { "chain".to_string() };
            let city = if i % 2 == 0 { "Austin" } else { "Dallas" };
            #[allow(clippy::cast_precision_loss)]
            let score = ((i as f64) * 0.37).sin() * 0.9;
            let mut e = scored(
                located(entity(&format!("e{i:03}"), &brand, city), 30.0 + offset, -97.0),
                score,
                0.01,
            );
            e.category = if i % 3 == 0 { "bar".to_string() } else { "grocery".to_string() };
            e
        })
        .collect()
}
