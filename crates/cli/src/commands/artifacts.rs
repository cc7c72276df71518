//! `mnemos artifacts` — Artifact management commands.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;

pub async fn list(
    config: MnemosConfig,
    artifact_type: Option<&str>,
    query: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ContextManager::from_config(config).await;
    println!("{}", manager.list_artifacts(artifact_type, query).await);
    Ok(())
}

pub async fn read(config: MnemosConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ContextManager::from_config(config).await;
    println!("{}", manager.read_artifact(id).await);
    Ok(())
}

pub async fn delete(config: MnemosConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ContextManager::from_config(config).await;
    let Some(store) = manager.artifacts() else {
        return Err("Artifact storage is disabled".into());
    };

    if store.delete(id).await? {
        println!("🗑️  Deleted artifact {id}");
    } else {
        println!("   No artifact with id {id}");
    }
    Ok(())
}
