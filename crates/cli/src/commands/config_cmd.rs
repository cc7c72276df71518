//! `mnemos config` — Print the effective configuration.

use mnemos_config::MnemosConfig;

const MASK: &str = "********";

pub fn show(config: &MnemosConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml = toml::to_string_pretty(&masked(config))?;
    println!("# Effective configuration (file + MNEMOS_* overrides)");
    println!("{toml}");
    Ok(())
}

/// A copy safe to print: secrets replaced.
fn masked(config: &MnemosConfig) -> MnemosConfig {
    let mut copy = config.clone();
    if copy.provider.api_key.is_some() {
        copy.provider.api_key = Some(MASK.into());
    }
    copy
}
