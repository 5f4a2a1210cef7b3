use anyhow::Context;
use intake_engine::{InMemorySessionStore, ScoringTables, SessionRunner};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cases::case_manager;
use crate::config::ServiceConfig;
use crate::enhancer::RigEnhancer;

/// Loads scoring tables from a JSON file, or the built-in tables without one.
pub fn load_scoring_tables(path: Option<&Path>) -> anyhow::Result<ScoringTables> {
    let Some(path) = path else {
        return Ok(ScoringTables::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scoring tables from {}", path.display()))?;
    let tables = ScoringTables::from_json(&json)
        .with_context(|| format!("Invalid scoring tables in {}", path.display()))?;
    info!(path = %path.display(), triggers = tables.triggers.len(), "Loaded scoring tables");
    Ok(tables)
}

/// Wires the session runner from configuration.
pub fn create_session_runner(config: &ServiceConfig) -> anyhow::Result<SessionRunner> {
    let tables = load_scoring_tables(config.scoring_table_path.as_deref())?;
    let store = Arc::new(InMemorySessionStore::new(
        config.sessions.ttl,
        config.sessions.capacity,
    ));

    let mut runner = SessionRunner::new(store, case_manager(&config.cases))
        .with_tables(Arc::new(tables))
        .with_case_type(config.cases.case_type_id.clone());

    match &config.enhancer {
        Some(enhancer) => {
            info!(model = %enhancer.model, "LLM enhancer enabled");
            runner = runner.with_enhancer(Arc::new(RigEnhancer::new(enhancer)), enhancer.timeout);
        }
        None => info!("OPENROUTER_API_KEY not set, using heuristic analysis only"),
    }

    Ok(runner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_file_is_an_error() {
        let result = load_scoring_tables(Some(Path::new("/nonexistent/scoring.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_tables_without_path() {
        let tables = load_scoring_tables(None).unwrap();
        assert_eq!(tables, ScoringTables::default());
    }

    #[test]
    fn test_tables_loaded_from_file() {
        let path = std::env::temp_dir().join(format!("scoring-{}.json", uuid::Uuid::new_v4()));
        let json = serde_json::to_string(&ScoringTables::default()).unwrap();
        std::fs::write(&path, json).unwrap();
        let tables = load_scoring_tables(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(tables.triggers.len(), ScoringTables::default().triggers.len());
    }
}
