//! `rustedcode config` — Show configuration.

use anyhow::Context;
use rustedcode_config::AppConfig;

pub fn run(default: bool) -> anyhow::Result<()> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load config")?;
    println!("# {}", AppConfig::config_path().display());
    print!("{}", config.redacted_toml());

    if let Err(e) = config.validate() {
        eprintln!("⚠️  {e}");
    }
    Ok(())
}
