//! `mnemos stats` — Per-store statistics.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;
use mnemos_memory::human_size;

pub async fn run(config: MnemosConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let memory_dir = config.memory_dir.clone();
    let manager = ContextManager::from_config(config).await;
    let stats = manager.stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("🧠 Memory Statistics");
    println!("====================");
    println!("  Memory dir:  {}", memory_dir.display());

    match &stats.similarity {
        Some(s) => {
            println!(
                "  Similarity:  {} documents ({} backend, model {})",
                s.documents, s.backend, s.embedding_model
            );
            if let Some(dim) = s.dimension {
                println!("               dimension {dim}, threshold {:.2}", s.threshold);
            }
        }
        None => println!("  Similarity:  disabled"),
    }

    match &stats.summaries {
        Some(s) => println!(
            "  Summaries:   {} across {} session(s), every {} rounds ({:.0}% compression)",
            s.total_summaries,
            s.sessions,
            s.after_rounds,
            s.overall_compression * 100.0
        ),
        None => println!("  Summaries:   disabled"),
    }

    match &stats.graph {
        Some(g) => {
            println!(
                "  Graph:       {} entities, {} relationships",
                g.total_entities, g.total_relationships
            );
            for (entity_type, count) in &g.entities_by_type {
                println!("      {entity_type:<14} {count}");
            }
        }
        None => println!("  Graph:       disabled"),
    }

    match &stats.artifacts {
        Some(a) => {
            println!(
                "  Artifacts:   {} ({})",
                a.total_artifacts,
                human_size(a.total_size_bytes)
            );
            if a.over_quota() {
                let quota = a.quota_bytes.unwrap_or_default();
                println!("\n  ⚠️  Artifact storage is over its {} quota", human_size(quota));
            }
        }
        None => println!("  Artifacts:   disabled"),
    }

    Ok(())
}
