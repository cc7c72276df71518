//! `mnemos summaries` — Show stored session summaries.

use mnemos_config::MnemosConfig;
use mnemos_context::ContextManager;

pub async fn run(config: MnemosConfig, session: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ContextManager::from_config(config).await;
    let Some(summarizer) = manager.summarizer() else {
        return Err("Summaries are disabled".into());
    };

    let mut summaries: Vec<_> = summarizer
        .all_summaries()
        .await
        .into_iter()
        .filter(|s| session.is_none_or(|id| s.session_id == id))
        .collect();
    summaries.sort_by(|a, b| {
        a.session_id
            .cmp(&b.session_id)
            .then(a.start_round.cmp(&b.start_round))
    });

    println!("📝 Session Summaries ({})", summaries.len());
    println!("========================");
    for s in &summaries {
        println!();
        println!(
            "  [{}] rounds {}-{} ({:.0}% compression)",
            s.session_id,
            s.start_round,
            s.end_round,
            s.compression_ratio() * 100.0
        );
        for line in s.summary_text.lines() {
            println!("    {line}");
        }
        for finding in &s.key_findings {
            println!("    - {finding}");
        }
        if !s.tools_used.is_empty() {
            println!("    tools: {}", s.tools_used.join(", "));
        }
    }
    Ok(())
}
