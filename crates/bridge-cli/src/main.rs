//! tool-bridge
//!
//! Interactive bridge between an LLM chat API and a stdio MCP tool server.
//!
//! ```text
//! tool-bridge servers/weather.py --provider openai --model gpt-4
//! ```

mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bridge_core::{BridgeClient, OrchestratorConfig, ProviderKind};
use bridge_runtime::{EnvAdapterFactory, McpServerConfig, McpToolSession, QueryWorker};

const DEFAULT_LOG_FILTER: &str = "warn,bridge_core=info,bridge_runtime=info";

#[derive(Debug, Parser)]
#[command(name = "tool-bridge", version, about = "Chat with an LLM that can call MCP tools")]
struct Args {
    /// Path to the MCP server script (.py or .js)
    server_script: PathBuf,

    /// LLM provider to start with
    #[arg(short, long, default_value = "anthropic")]
    provider: ProviderKind,

    /// Model alias or wire id; the provider default when omitted
    #[arg(short, long)]
    model: Option<String>,

    /// Token cap for each provider call
    #[arg(long, default_value_t = bridge_core::provider::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Provider calls allowed per query
    #[arg(long, default_value_t = bridge_core::orchestrator::DEFAULT_MAX_ROUND_TRIPS)]
    max_round_trips: usize,

    /// Continue one conversation across queries
    #[arg(long)]
    keep_history: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logs go to stderr so the REPL owns stdout
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    anyhow::ensure!(args.max_round_trips > 0, "--max-round-trips must be at least 1");

    let config = McpServerConfig::for_script(&args.server_script)?;
    let session = Arc::new(
        McpToolSession::connect(config)
            .await
            .with_context(|| format!("failed to connect to {}", args.server_script.display()))?,
    );

    let mut builder = BridgeClient::builder()
        .tool_session(session.clone())
        .adapter_factory(Arc::new(EnvAdapterFactory))
        .provider(args.provider)
        .config(OrchestratorConfig {
            max_round_trips: args.max_round_trips,
            max_tokens: args.max_tokens,
        });
    if let Some(model) = &args.model {
        builder = builder.model(model);
    }

    let client = match builder.build().await {
        Ok(client) => client,
        Err(e) => {
            session.shutdown().await;
            return Err(e.into());
        }
    };

    let (worker, task) = QueryWorker::spawn(client, args.keep_history);
    let result = tokio::select! {
        result = repl::run(&worker, repl::stdin_lines(), tokio::io::stdout()) => {
            let _ = worker.shutdown().await;
            let _ = task.await;
            result
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nExiting...");
            task.abort();
            Ok(())
        }
    };

    session.shutdown().await;
    result
}
