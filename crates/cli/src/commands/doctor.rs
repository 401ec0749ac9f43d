//! `rustedcode doctor` — Diagnose system health.

use rustedcode_config::AppConfig;
use rustedcode_core::provider::Provider;
use rustedcode_providers::OpenAiCompatProvider;

pub async fn run() -> anyhow::Result<()> {
    println!("🩺 RustedCode Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ℹ️  No config file, using defaults and environment");
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };
    match config.validate() {
        Ok(()) => println!("  ✅ Config valid"),
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    let root = config.tools.resolved_workspace_root();
    if root.is_dir() {
        println!("  ✅ Workspace root exists: {}", root.display());
    } else {
        println!("  ❌ Workspace root missing: {}", root.display());
        issues += 1;
    }

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set RUSTEDCODE_API_KEY");
        issues += 1;
    }

    match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable: {}", provider.base_url()),
            Ok(false) => {
                println!("  ⚠️  Provider answered with an error: {}", provider.base_url());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not usable: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
