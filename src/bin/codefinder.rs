//! Clinical code finder CLI
//!
//! One-shot or interactive query resolution against the Clinical Tables
//! vocabularies. Requires completion-provider credentials in the
//! environment (see `AGENT_BACKEND`).

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};

use clinical_codes::{CodeFinderAgent, ConversationTurn, PipelineState};

#[derive(Parser)]
#[command(name = "codefinder", about = "Resolve clinical queries to vocabulary codes")]
struct Args {
    /// Query to resolve; omit for an interactive session
    query: Option<String>,

    /// Print the per-call audit trail
    #[arg(long)]
    audit: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinical_codes=info".into()),
        )
        .init();

    let args = Args::parse();
    let agent = CodeFinderAgent::from_env()?;

    match args.query {
        Some(query) => {
            let state = agent.run(&query, &[]).await?;
            print_state(&state, args.audit);
        }
        None => {
            let mut history: Vec<ConversationTurn> = Vec::new();
            let stdin = io::stdin();
            loop {
                print!("query> ");
                io::stdout().flush()?;
                let Some(line) = stdin.lock().lines().next() else {
                    break;
                };
                let query = line?.trim().to_string();
                if query.is_empty() || query == "quit" {
                    break;
                }
                match agent.run(&query, &history).await {
                    Ok(state) => {
                        print_state(&state, args.audit);
                        history.push(state.to_turn());
                    }
                    Err(e) => eprintln!("run failed: {e}"),
                }
            }
        }
    }

    Ok(())
}

fn print_state(state: &PipelineState, audit: bool) {
    println!(
        "\nIntent: {} via {} (refined: '{}')",
        state.intent.concept, state.intent.primary_system, state.intent.refined_query
    );

    for (system, hits) in &state.filtered_results {
        let confidence = state.confidence_scores.get(system).copied().unwrap_or(0.0);
        println!("\n{} (confidence {:.1}):", system.as_str().to_uppercase(), confidence);
        for hit in hits {
            println!("  {:<12} {}", hit.code, hit.display);
        }
    }

    if state.filtered_results.is_empty() {
        println!("\nNo codes found.");
    }

    println!("\n--- Summary ---\n{}", state.summary);

    if audit {
        println!("\n--- Audit ---");
        for call in &state.api_calls {
            println!("{}: '{}' -> {} results", call.system, call.query, call.result_count);
        }
    }
}
