use std::io::Write as _;

use super::*;

fn entity(id: &str, brand: &str) -> EntityState {
    EntityState {
        entity_id: id.to_string(),
        brand_id: brand.to_string(),
        city: "Charleston".to_string(),
        country: "US".to_string(),
        latitude: Some(32.776_5),
        longitude: Some(-79.931_1),
        category: "bottle_shop".to_string(),
        sentiment_score: 0.2,
        sentiment_trend: 0.01,
        observation_count: 4,
        last_updated: Utc::now(),
    }
}

#[test]
fn coordinates_require_both_halves() {
    let mut e = entity("a", "x");
    e.longitude = None;
    assert!(e.coordinates().is_none());
}

#[test]
fn city_key_is_case_insensitive_and_country_scoped() {
    let mut a = entity("a", "x");
    let mut b = entity("b", "x");
    a.city = "  Charleston ".to_string();
    b.city = "CHARLESTON".to_string();
    assert_eq!(a.city_key(), b.city_key());

    b.country = "CA".to_string();
    assert_ne!(a.city_key(), b.city_key());
}

#[test]
fn city_key_empty_when_city_unknown() {
    let mut e = entity("a", "x");
    e.city = "   ".to_string();
    assert!(e.city_key().is_empty());
}

#[test]
fn clamped_pulls_score_into_bounds() {
    let mut e = entity("a", "x");
    e.sentiment_score = 3.0;
    assert!((e.clamped().sentiment_score - SENTIMENT_MAX).abs() < f64::EPSILON);
}

#[test]
fn validate_accepts_well_formed_entities() {
    let entities = vec![entity("a", "x"), entity("b", "y")];
    assert!(validate_entities(&entities).is_ok());
}

#[test]
fn validate_rejects_duplicate_ids() {
    let entities = vec![entity("a", "x"), entity("a", "y")];
    let err = validate_entities(&entities).unwrap_err();
    assert!(
        matches!(err, ConfigError::Validation(ref msg) if msg.contains("duplicate entity_id")),
        "expected duplicate id error, got: {err:?}"
    );
}

#[test]
fn validate_rejects_empty_brand() {
    let entities = vec![entity("a", " ")];
    assert!(validate_entities(&entities).is_err());
}

#[test]
fn validate_rejects_out_of_bounds_score() {
    let mut e = entity("a", "x");
    e.sentiment_score = -1.5;
    assert!(validate_entities(&[e]).is_err());
}

#[test]
fn validate_rejects_nan_score() {
    let mut e = entity("a", "x");
    e.sentiment_score = f64::NAN;
    assert!(validate_entities(&[e]).is_err());
}

#[test]
fn validate_rejects_out_of_range_latitude() {
    let mut e = entity("a", "x");
    e.latitude = Some(91.0);
    assert!(validate_entities(&[e]).is_err());
}

#[test]
fn load_entities_reads_yaml_file() {
    let dir = std::env::temp_dir().join(format!("scbdb-entities-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("entities.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "entities:\n  - entity_id: store-1\n    brand_id: cann\n    city: Austin\n    latitude: 30.27\n    longitude: -97.74\n    sentiment_score: 0.4\n    sentiment_trend: 0.02\n    observation_count: 3\n    last_updated: 2026-01-01T00:00:00Z\n  - entity_id: store-2\n    brand_id: cann\n    sentiment_score: -0.1\n    last_updated: 2026-01-01T00:00:00Z"
    )
    .unwrap();

    let loaded = load_entities(&path).unwrap();
    assert_eq!(loaded.entities.len(), 2);
    assert_eq!(loaded.entities[0].city, "Austin");
    assert!(loaded.entities[1].coordinates().is_none());
    assert_eq!(loaded.entities[1].observation_count, 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn load_entities_missing_file_is_io_error() {
    let err = load_entities(Path::new("/nonexistent/entities.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::EntitiesFileIo { .. }));
}
