//! finrag 命令行：提问、文档入库、依赖健康检查
//!
//! 与 HTTP 服务共用同一套 Services（见 core::builder）。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use finrag::core::{check_cache, check_llm, check_vector_store, create_services_builder, Services};
use finrag::observability::init_logging;
use finrag::workflow::{ChatInput, WorkflowEvent};

#[derive(Parser)]
#[command(name = "finrag")]
#[command(about = "Financial agentic RAG assistant")]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question
    Ask {
        message: String,
        #[arg(long, default_value = "cli")]
        user_id: String,
        /// Print stage progress and response updates as they happen
        #[arg(long)]
        stream: bool,
    },
    /// Ingest a file, or every supported file under a directory
    Ingest { path: PathBuf },
    /// Check the LLM, cache and vector store
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let builder = create_services_builder(cli.config);
    let _log_guard = init_logging(&builder.config().app);
    let services = builder.build().context("Failed to build services")?;

    match cli.command {
        Command::Ask {
            message,
            user_id,
            stream,
        } => ask(&services, ChatInput::new(user_id, message), stream).await,
        Command::Ingest { path } => ingest(&services, path).await,
        Command::Health => health(&services).await,
    }
}

async fn ask(services: &Services, input: ChatInput, stream: bool) -> anyhow::Result<()> {
    if !stream {
        let output = services.workflow.run(input).await.context("Workflow failed")?;
        println!("{}", output.response);
        if output.is_cached {
            eprintln!("(cached)");
        }
        if !output.tools_used.is_empty() {
            eprintln!("tools: {}", output.tools_used.join(", "));
        }
        return Ok(());
    }

    let mut events = Box::pin(services.workflow.clone().stream(input));
    while let Some(ev) = events.next().await {
        match ev {
            WorkflowEvent::NodeStarted { node } => eprintln!("» {:?}", node),
            WorkflowEvent::Plan { steps } => {
                for (i, step) in steps.iter().enumerate() {
                    eprintln!("  {}. {}", i + 1, step);
                }
            }
            WorkflowEvent::Route { route, overridden } => {
                eprintln!("  → {}{}", route, if overridden { " (guarded)" } else { "" });
            }
            WorkflowEvent::Response { text } => println!("{}\n", text),
            WorkflowEvent::Done { output } => {
                if !output.tools_used.is_empty() {
                    eprintln!("tools: {}", output.tools_used.join(", "));
                }
            }
            WorkflowEvent::Error { message } => bail!("Workflow failed: {}", message),
        }
    }
    Ok(())
}

async fn ingest(services: &Services, path: PathBuf) -> anyhow::Result<()> {
    let results = services.ingestion.ingest_path(&path).await;
    if results.is_empty() {
        bail!("No supported files (.txt, .md, .html) found at {}", path.display());
    }
    let mut failed = 0;
    for (file, result) in results {
        match result {
            Ok(report) => match report.error {
                None => println!("{}: stored {} chunks", file.display(), report.stored_count),
                Some(e) => {
                    failed += 1;
                    println!("{}: stored {} chunks, error: {}", file.display(), report.stored_count, e);
                }
            },
            Err(e) => {
                failed += 1;
                println!("{}: failed: {}", file.display(), e);
            }
        }
    }
    if failed > 0 {
        bail!("{} file(s) failed to ingest", failed);
    }
    Ok(())
}

async fn health(services: &Services) -> anyhow::Result<()> {
    let reports = [
        check_llm(services.llm.as_ref()).await,
        check_cache(services.cache.as_ref()).await,
        check_vector_store(services.index.as_ref()).await,
    ];
    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }
    if reports.iter().any(|r| !r.healthy) {
        bail!("Some dependencies are unhealthy");
    }
    Ok(())
}
