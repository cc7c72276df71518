//! `mnemos search` — Semantic search over indexed results.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;

pub async fn run(config: MnemosConfig, query: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    if query.trim().is_empty() {
        return Err("Search query must not be empty".into());
    }

    let manager = ContextManager::from_config(config).await;
    println!("🔍 Searching memory for: \"{query}\"");
    println!();
    println!("{}", manager.search_memory(query, limit).await);
    Ok(())
}
