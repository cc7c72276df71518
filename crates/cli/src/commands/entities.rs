//! `mnemos entities` — Query the entity graph.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;

pub async fn run(
    config: MnemosConfig,
    query: Option<&str>,
    entity_type: Option<&str>,
    relationships: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ContextManager::from_config(config).await;
    println!("{}", manager.get_entities(query, entity_type, relationships).await);
    Ok(())
}
