use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{
    CacheSettings, CriticalitySettings, EchoSettings, EngineConfig, GraphWeights,
    MonteCarloSettings, ProximityDecay, SignalSettings,
};
use crate::ConfigError;

/// Load engine configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are unparseable or fail validation.
pub fn load_engine_config() -> Result<EngineConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_engine_config_from_env()
}

/// Load engine configuration from environment variables already in the process.
///
/// Unlike [`load_engine_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are unparseable or fail validation.
pub fn load_engine_config_from_env() -> Result<EngineConfig, ConfigError> {
    build_engine_config(|key| std::env::var(key))
}

/// Build engine configuration using the provided env-var lookup function.
///
/// Every setting is optional; missing vars fall back to the defaults in
/// [`EngineConfig::default`]. The assembled config is validated before return.
fn build_engine_config<F>(lookup: F) -> Result<EngineConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let defaults = EngineConfig::default();

    let log_level = lookup("SCBDB_LOG_LEVEL").unwrap_or(defaults.log_level);
    let entities_path = lookup("SCBDB_ENTITIES_PATH")
        .map_or(defaults.entities_path, PathBuf::from);
    let worker_threads = parse_or(&lookup, "SCBDB_WORKER_THREADS", defaults.worker_threads)?;

    let d = defaults.graph;
    let graph = GraphWeights {
        self_weight: parse_or(&lookup, "SCBDB_SELF_WEIGHT", d.self_weight)?,
        brand_weight: parse_or(&lookup, "SCBDB_BRAND_WEIGHT", d.brand_weight)?,
        proximity_weight: parse_or(&lookup, "SCBDB_PROXIMITY_WEIGHT", d.proximity_weight)?,
        city_weight: parse_or(&lookup, "SCBDB_CITY_WEIGHT", d.city_weight)?,
        category_weight: parse_or(&lookup, "SCBDB_CATEGORY_WEIGHT", d.category_weight)?,
        proximity_radius_km: parse_or(
            &lookup,
            "SCBDB_PROXIMITY_RADIUS_KM",
            d.proximity_radius_km,
        )?,
        proximity_decay: match lookup("SCBDB_PROXIMITY_DECAY") {
            Ok(raw) => parse_decay(&raw)?,
            Err(_) => d.proximity_decay,
        },
        max_neighbors: match parse_opt(&lookup, "SCBDB_MAX_NEIGHBORS")? {
            Some(cap) => Some(cap),
            None => d.max_neighbors,
        },
    };

    let d = defaults.echo;
    let echo = EchoSettings {
        delta: parse_or(&lookup, "SCBDB_ECHO_DELTA", d.delta)?,
        horizon: parse_or(&lookup, "SCBDB_ECHO_HORIZON", d.horizon)?,
        max_horizon: parse_or(&lookup, "SCBDB_ECHO_MAX_HORIZON", d.max_horizon)?,
        unstable_threshold: parse_or(&lookup, "SCBDB_UNSTABLE_THRESHOLD", d.unstable_threshold)?,
        chaotic_threshold: parse_or(&lookup, "SCBDB_CHAOTIC_THRESHOLD", d.chaotic_threshold)?,
    };

    let d = defaults.monte_carlo;
    let monte_carlo = MonteCarloSettings {
        trials: parse_or(&lookup, "SCBDB_MC_TRIALS", d.trials)?,
        timeout_ms: parse_or(&lookup, "SCBDB_MC_TIMEOUT_MS", d.timeout_ms)?,
        delta_min: parse_or(&lookup, "SCBDB_MC_DELTA_MIN", d.delta_min)?,
        delta_max: parse_or(&lookup, "SCBDB_MC_DELTA_MAX", d.delta_max)?,
        batch_size: parse_or(&lookup, "SCBDB_MC_BATCH_SIZE", d.batch_size)?,
    };

    let d = defaults.criticality;
    let criticality = CriticalitySettings {
        sample_limit: parse_or(&lookup, "SCBDB_CRITICALITY_SAMPLE_LIMIT", d.sample_limit)?,
        sample_seed: parse_or(&lookup, "SCBDB_CRITICALITY_SAMPLE_SEED", d.sample_seed)?,
    };

    let d = defaults.signal;
    let signal = SignalSettings {
        trend_scale: parse_or(&lookup, "SCBDB_SIGNAL_TREND_SCALE", d.trend_scale)?,
        min_confidence: parse_or(&lookup, "SCBDB_SIGNAL_MIN_CONFIDENCE", d.min_confidence)?,
    };

    let d = defaults.cache;
    let cache = CacheSettings {
        ttl_secs: parse_or(&lookup, "SCBDB_CACHE_TTL_SECS", d.ttl_secs)?,
        max_entries: parse_or(&lookup, "SCBDB_CACHE_MAX_ENTRIES", d.max_entries)?,
    };

    let config = EngineConfig {
        log_level,
        entities_path,
        worker_threads,
        graph,
        echo,
        monte_carlo,
        criticality,
        signal,
        cache,
    };
    config.validate()?;
    Ok(config)
}

/// Parse `var` when set; `None` when unset.
fn parse_opt<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let Ok(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn parse_or<T, F>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}

/// Parse the proximity decay name. Unknown names are rejected rather than
/// silently defaulted, since the decay shape changes every edge weight.
fn parse_decay(s: &str) -> Result<ProximityDecay, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "linear" => Ok(ProximityDecay::Linear),
        "exponential" => Ok(ProximityDecay::Exponential),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SCBDB_PROXIMITY_DECAY".to_string(),
            reason: format!("unknown decay '{other}'; expected linear or exponential"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
