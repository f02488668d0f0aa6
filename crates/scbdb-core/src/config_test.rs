use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn parse_decay_linear() {
    assert_eq!(parse_decay("linear").unwrap(), ProximityDecay::Linear);
}

#[test]
fn parse_decay_exponential_is_case_insensitive() {
    assert_eq!(
        parse_decay("Exponential").unwrap(),
        ProximityDecay::Exponential
    );
}

#[test]
fn parse_decay_unknown_fails() {
    let err = parse_decay("gaussian").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "SCBDB_PROXIMITY_DECAY"));
}

#[test]
fn build_engine_config_succeeds_with_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let result = build_engine_config(lookup_from_map(&map));
    assert!(result.is_ok(), "expected Ok, got: {result:?}");
    let cfg = result.unwrap();
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.worker_threads, 0);
    assert!((cfg.graph.self_weight - 0.70).abs() < f64::EPSILON);
    assert!((cfg.graph.brand_weight - 0.20).abs() < f64::EPSILON);
    assert!((cfg.graph.proximity_weight - 0.15).abs() < f64::EPSILON);
    assert!((cfg.graph.city_weight - 0.08).abs() < f64::EPSILON);
    assert!((cfg.graph.category_weight - 0.05).abs() < f64::EPSILON);
    assert!((cfg.graph.proximity_radius_km - 50.0).abs() < f64::EPSILON);
    assert_eq!(cfg.graph.proximity_decay, ProximityDecay::Linear);
    assert_eq!(cfg.graph.max_neighbors, None);
    assert_eq!(cfg.echo.horizon, 4);
    assert!((cfg.echo.unstable_threshold - 1.5).abs() < f64::EPSILON);
    assert!((cfg.echo.chaotic_threshold - 3.5).abs() < f64::EPSILON);
    assert_eq!(cfg.monte_carlo.trials, 1000);
    assert_eq!(cfg.monte_carlo.timeout_ms, 30_000);
    assert_eq!(cfg.criticality.sample_limit, 5000);
    assert!((cfg.signal.trend_scale - 5.0).abs() < f64::EPSILON);
    assert!((cfg.signal.min_confidence - 0.1).abs() < f64::EPSILON);
    assert_eq!(cfg.cache.ttl_secs, 3600);
    assert_eq!(cfg.cache.max_entries, 100_000);
}

#[test]
fn build_engine_config_empty_env_matches_default_sections() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_engine_config(lookup_from_map(&map)).unwrap();
    let defaults = EngineConfig::default();
    assert_eq!(cfg.log_level, defaults.log_level);
    assert_eq!(cfg.entities_path, defaults.entities_path);
    assert_eq!(cfg.worker_threads, defaults.worker_threads);
    assert_eq!(cfg.graph, defaults.graph);
    assert_eq!(cfg.echo, defaults.echo);
    assert_eq!(cfg.monte_carlo, defaults.monte_carlo);
    assert_eq!(cfg.criticality, defaults.criticality);
    assert_eq!(cfg.signal, defaults.signal);
    assert_eq!(cfg.cache, defaults.cache);
}

#[test]
fn build_engine_config_reads_neighbor_cap_and_cache_bound() {
    let mut map = HashMap::new();
    map.insert("SCBDB_MAX_NEIGHBORS", "64");
    map.insert("SCBDB_CACHE_MAX_ENTRIES", "500");
    let cfg = build_engine_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.graph.max_neighbors, Some(64));
    assert_eq!(cfg.cache.max_entries, 500);
}

#[test]
fn build_engine_config_rejects_zero_neighbor_cap() {
    let mut map = HashMap::new();
    map.insert("SCBDB_MAX_NEIGHBORS", "0");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn build_engine_config_rejects_zero_cache_capacity() {
    let mut map = HashMap::new();
    map.insert("SCBDB_CACHE_MAX_ENTRIES", "0");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn build_engine_config_reads_overrides() {
    let mut map = HashMap::new();
    map.insert("SCBDB_LOG_LEVEL", "debug");
    map.insert("SCBDB_ECHO_HORIZON", "6");
    map.insert("SCBDB_MC_TRIALS", "50");
    map.insert("SCBDB_PROXIMITY_DECAY", "exponential");
    map.insert("SCBDB_CACHE_TTL_SECS", "60");
    let cfg = build_engine_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.echo.horizon, 6);
    assert_eq!(cfg.monte_carlo.trials, 50);
    assert_eq!(cfg.graph.proximity_decay, ProximityDecay::Exponential);
    assert_eq!(cfg.cache.ttl_secs, 60);
}

#[test]
fn build_engine_config_fails_with_unparseable_weight() {
    let mut map = HashMap::new();
    map.insert("SCBDB_BRAND_WEIGHT", "heavy");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "SCBDB_BRAND_WEIGHT"),
        "expected InvalidEnvVar(SCBDB_BRAND_WEIGHT), got: {result:?}"
    );
}

#[test]
fn build_engine_config_rejects_bonus_weights_over_one() {
    let mut map = HashMap::new();
    map.insert("SCBDB_BRAND_WEIGHT", "0.9");
    map.insert("SCBDB_PROXIMITY_WEIGHT", "0.5");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("non-self")),
        "expected Validation error for bonus sum, got: {result:?}"
    );
}

#[test]
fn build_engine_config_rejects_inverted_thresholds() {
    let mut map = HashMap::new();
    map.insert("SCBDB_UNSTABLE_THRESHOLD", "4.0");
    map.insert("SCBDB_CHAOTIC_THRESHOLD", "3.5");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Validation(_))),
        "expected Validation error, got: {result:?}"
    );
}

#[test]
fn build_engine_config_rejects_zero_horizon() {
    let mut map = HashMap::new();
    map.insert("SCBDB_ECHO_HORIZON", "0");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn build_engine_config_rejects_zero_trials() {
    let mut map = HashMap::new();
    map.insert("SCBDB_MC_TRIALS", "0");
    let result = build_engine_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn graph_weights_reject_self_weight_above_one() {
    let weights = GraphWeights {
        self_weight: 1.2,
        ..GraphWeights::default()
    };
    assert!(weights.validate().is_err());
}

#[test]
fn graph_weights_reject_negative_bonus() {
    let weights = GraphWeights {
        city_weight: -0.1,
        ..GraphWeights::default()
    };
    assert!(weights.validate().is_err());
}

#[test]
fn graph_weights_default_bonus_total() {
    let total = GraphWeights::default().bonus_total();
    assert!((total - 0.48).abs() < 1e-12, "got {total}");
}

#[test]
fn effective_workers_never_zero() {
    let cfg = EngineConfig::default();
    assert!(cfg.effective_workers() >= 1);
    let fixed = EngineConfig {
        worker_threads: 3,
        ..EngineConfig::default()
    };
    assert_eq!(fixed.effective_workers(), 3);
}

#[test]
fn proximity_decay_serializes_lowercase() {
    let json = serde_json::to_string(&ProximityDecay::Exponential).unwrap();
    assert_eq!(json, "\"exponential\"");
    assert_eq!(ProximityDecay::Linear.to_string(), "linear");
}
