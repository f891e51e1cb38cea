//! Memory Agent - Conversational assistant with confirmation-gated memory
//!
//! Chats on the terminal and asks before remembering anything.

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use memory_agent::{
    agent::{Checkpointer, FileCheckpointer, InMemoryCheckpointer, Interrupt},
    config::{CheckpointBackend, MemoryAgentConfig},
    llm::AnthropicClient,
    memory::InMemoryStore,
    Identity, MemoryAgent, Resume, TurnOutcome,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memory-agent")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Conversational assistant with confirmation-gated memory")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMORY_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat on the terminal
    Chat {
        /// User the conversation belongs to
        #[arg(short, long)]
        user: String,

        /// Conversation thread (defaults to the user id)
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("memory_agent={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match cli.config {
        Some(path) => MemoryAgentConfig::from_file(path)?,
        None => MemoryAgentConfig::default(),
    };

    match cli.command {
        Commands::Chat { user, thread } => {
            let thread = thread.unwrap_or_else(|| user.clone());
            run_chat(config, Identity::new(user), thread).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn build_agent(config: &MemoryAgentConfig) -> Result<MemoryAgent> {
    let spec = config.model.spec();
    match spec.provider.as_deref() {
        None | Some("anthropic") => {}
        Some(other) => bail!("Unsupported model provider '{}'", other),
    }

    let api_key = config
        .model
        .resolve_api_key()
        .ok_or_else(|| anyhow!("No API key found; set {}", config.model.api_key_env))?;
    let mut client = AnthropicClient::new(
        api_key,
        spec.model,
        Duration::from_secs(config.model.timeout_secs),
    )?;
    if let Some(base_url) = &config.model.base_url {
        client = client.with_base_url(base_url.clone());
    }

    let checkpointer: Arc<dyn Checkpointer> = match config.storage.checkpoints {
        CheckpointBackend::Memory => Arc::new(InMemoryCheckpointer::new()),
        CheckpointBackend::File => {
            Arc::new(FileCheckpointer::new(&config.storage.checkpoint_dir).await?)
        }
    };

    Ok(MemoryAgent::new(
        Arc::new(client),
        Arc::new(InMemoryStore::new()),
        checkpointer,
        config.agent.clone(),
    )
    .with_sampling(config.model.max_tokens, config.model.temperature))
}

async fn run_chat(config: MemoryAgentConfig, identity: Identity, thread: String) -> Result<()> {
    let agent = build_agent(&config).await?;
    tracing::info!(user_id = %identity.user_id, thread_id = %thread, "Starting chat");

    println!("Chatting as '{}' on thread '{}'.", identity.user_id, thread);
    println!("Commands: /memories, /quit");
    println!();

    let mut pending: Option<Interrupt> = agent.pending_interrupt(&thread, &identity).await?;
    if let Some(interrupt) = &pending {
        println!("{}", interrupt.prompt);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", if pending.is_some() { "confirm> " } else { "> " });
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/memories" => {
                print_memories(&agent, &identity).await?;
                continue;
            }
            _ => {}
        }

        let result = match pending.take() {
            Some(interrupt) => {
                agent
                    .resume(&thread, &identity, Resume::new(line).for_interrupt(interrupt.id))
                    .await
            }
            None => agent.handle_turn(&thread, &identity, line).await,
        };

        match result {
            Ok(TurnOutcome::Completed { reply }) => println!("{}", reply),
            Ok(TurnOutcome::Interrupted(interrupt)) => {
                println!("{}", interrupt.prompt);
                pending = Some(interrupt);
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                eprintln!("error: {}", e);
                pending = agent.pending_interrupt(&thread, &identity).await?;
            }
        }
    }

    Ok(())
}

async fn print_memories(agent: &MemoryAgent, identity: &Identity) -> Result<()> {
    let records = agent.memories(&identity.user_id, None).await?;
    if records.is_empty() {
        println!("No memories stored.");
        return Ok(());
    }
    for record in records {
        println!(
            "[{}] {}: {} ({})",
            record.category(),
            record.id,
            record.content(),
            record.context()
        );
    }
    Ok(())
}

fn show_config(config: Option<&MemoryAgentConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}
