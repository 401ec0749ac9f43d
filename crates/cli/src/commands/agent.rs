//! `rustedcode agent` — Interactive or single-message chat mode.

use std::io::{BufRead, Write};

use anyhow::{Context, bail};
use rustedcode_agent::{Orchestrator, TurnOutcome, TurnRequest};
use rustedcode_config::AppConfig;
use rustedcode_core::state::{CompletionStatus, TurnContext};
use tokio_util::sync::CancellationToken;

use crate::runtime::Runtime;

pub async fn run(
    message: Option<String>,
    conversation: Option<String>,
    max_iterations: Option<u32>,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    // Check for API key early — give a clear error
    if !config.has_api_key() && !is_local(&config.provider.base_url) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    RUSTEDCODE_API_KEY=...   (generic)");
        eprintln!("    OPENAI_API_KEY=...       (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let runtime = Runtime::build(&config, max_iterations)?;
    let conversation_id = conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let context = project_context(&config);

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = run_turn(&runtime.orchestrator, &conversation_id, &msg, context).await;
        eprint!("\r              \r");
        print_outcome(&outcome);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║      RustedCode Agent — Interactive Mode      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:      {}", config.provider.name);
    println!("  Model:         {}", config.provider.model);
    println!("  Workspace:     {}", config.tools.resolved_workspace_root().display());
    println!("  Tools:         {}", runtime.registry.len());
    println!("  State:         {}", runtime.store.name());
    println!("  Conversation:  {conversation_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels a running request. Type 'exit' to quit.");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        eprint!("  ...");
        let outcome =
            run_turn(&runtime.orchestrator, &conversation_id, input, context.clone()).await;
        eprint!("\r     \r");
        print_outcome(&outcome);
        println!();
    }

    println!("  Goodbye! Resume with --conversation {conversation_id}");
    Ok(())
}

/// Run one turn; Ctrl+C cancels it instead of killing the process.
async fn run_turn(
    orchestrator: &Orchestrator,
    conversation_id: &str,
    message: &str,
    context: TurnContext,
) -> TurnOutcome {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let request = TurnRequest::new(conversation_id, message)
        .with_context(context)
        .with_cancellation(cancel);
    let outcome = orchestrator.run_turn(request).await;
    watcher.abort();
    outcome
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("  Agent > {}", outcome.response);
    match outcome.status {
        CompletionStatus::Cancelled => eprintln!("  (cancelled)"),
        CompletionStatus::Failed => eprintln!("  (failed, trace {})", outcome.trace_id),
        _ if outcome.iteration_exhausted => {
            eprintln!("  (stopped at the iteration limit)")
        }
        _ => {}
    }
}

/// Project metadata handed to the decision model.
fn project_context(config: &AppConfig) -> TurnContext {
    let root = config.tools.resolved_workspace_root();
    TurnContext {
        project: Some(serde_json::json!({ "root": root.display().to_string() })),
        editor: None,
    }
}

fn is_local(base_url: &str) -> bool {
    base_url.contains("localhost") || base_url.contains("127.0.0.1")
}
