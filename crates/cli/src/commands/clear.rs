//! `mnemos clear` — Wipe memory.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;

pub async fn run(
    mut config: MnemosConfig,
    confirm: bool,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm {
        match &session {
            Some(id) => println!("⚠️  This will delete all summaries of session {id}."),
            None => println!("⚠️  This will delete the similarity index and entity graph permanently."),
        }
        println!("   Artifacts are kept. Run with --confirm to proceed:");
        println!("   mnemos clear --confirm");
        return Ok(());
    }

    let scoped = session.is_some();
    if scoped {
        config.session_id = session;
    }
    let manager = ContextManager::from_config(config).await;

    let message = if scoped {
        manager.clear_session().await
    } else {
        manager.clear_all().await
    };
    println!("🗑️  {message}");
    Ok(())
}
