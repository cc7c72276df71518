//! Subcommand implementations. Each opens only what it needs.

pub mod artifacts;
pub mod clear;
pub mod config_cmd;
pub mod entities;
pub mod search;
pub mod stats;
pub mod summaries;

use std::path::Path;

use mnemos_config::MnemosConfig;

/// Load `path` (or the default location) with `MNEMOS_*` overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<MnemosConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = MnemosConfig::load_from(path).map_err(|e| format!("Failed to load config: {e}"))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
                .validate()
                .map_err(|e| format!("Invalid configuration: {e}"))?;
            config
        }
        None => MnemosConfig::load().map_err(|e| format!("Failed to load config: {e}"))?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "enable_memory = true\n\n[graph]\nmax_entities = 42\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.graph.max_entities, 42);
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "enable_memory = \"maybe\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().starts_with("Failed to load config"));
    }
}
