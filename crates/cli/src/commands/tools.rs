//! `rustedcode tools` — List the built-in tools.

use anyhow::Context;
use rustedcode_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let registry = rustedcode_tools::default_registry(&config.tools);

    println!("🔧 {} tools available", registry.len());
    println!(
        "   Workspace: {}\n",
        config.tools.resolved_workspace_root().display()
    );
    for def in registry.definitions() {
        println!("  {}", def.name);
        println!("    {}", def.description);
        let schema = serde_json::to_string(&def.input_schema)?;
        println!("    input: {schema}\n");
    }
    Ok(())
}
