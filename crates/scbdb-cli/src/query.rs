//! Query dispatch against a rebuilt engine.
//!
//! Runs on a blocking worker; every result is returned as JSON for printing.

use scbdb_propagation::{PropagationEngine, Scope};
use serde_json::Value;

use crate::Commands;

/// Execute `command` against the engine's active snapshot.
///
/// # Errors
///
/// Returns the engine error for a failed query, or a serialization error.
pub(crate) fn run(engine: &PropagationEngine, command: Commands) -> anyhow::Result<Value> {
    let value = match command {
        Commands::Echo {
            entity,
            delta,
            horizon,
        } => serde_json::to_value(engine.compute_echo(&entity, delta, horizon)?)?,
        Commands::Profile {
            entity,
            delta,
            horizon,
            limit,
        } => serde_json::to_value(engine.echo_profile(&entity, delta, horizon, limit)?)?,
        Commands::MonteCarlo {
            scope,
            trials,
            seed,
        } => {
            let scope = scope.scope().unwrap_or(Scope::All);
            serde_json::to_value(engine.run_monte_carlo(&scope, trials, seed)?)?
        }
        Commands::Rank { top_k, scope } => {
            let scope = scope.scope();
            serde_json::to_value(engine.rank_critical(top_k, scope.as_ref())?)?
        }
        Commands::Signal { entity } => serde_json::to_value(engine.generate_signal(&entity)?)?,
        Commands::Health => serde_json::to_value(engine.health())?,
    };
    Ok(value)
}
