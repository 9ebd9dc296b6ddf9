//! Brick Client - Main Entry Point
//!
//! Command line access to a Brick server: one-shot generation, an
//! interactive chat loop and the stop command.

use anyhow::{Context, Result};
use brick_client::LlmClient;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "brick-client", version, about = "Streaming LLM client")]
struct Cli {
    /// Server endpoint
    #[arg(long, env = "BRICK_ENDPOINT", default_value = "http://localhost:50051")]
    endpoint: String,

    /// Deadline for each call, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a single completion to stdout
    Generate {
        prompt: String,

        #[arg(long, default_value_t = 100)]
        max_tokens: i32,
    },

    /// Read prompts from stdin until EOF or `exit`
    Chat {
        #[arg(long, default_value_t = 100)]
        max_tokens: i32,
    },

    /// Ask the server to drain and stop
    Stop {
        #[arg(long, default_value = "requested from brick-client")]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brick_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let mut client = LlmClient::connect(&cli.endpoint)
        .await
        .with_context(|| format!("failed to connect to {}", cli.endpoint))?
        .with_timeout(Duration::from_secs(cli.timeout_secs));

    match cli.command {
        Command::Generate { prompt, max_tokens } => {
            stream_reply(&mut client, &prompt, max_tokens).await?;
        }
        Command::Chat { max_tokens } => chat(&mut client, max_tokens).await?,
        Command::Stop { reason } => {
            let ack = client.stop_server(&reason).await?;
            println!("{}", ack);
        }
    }

    Ok(())
}

async fn stream_reply(client: &mut LlmClient, prompt: &str, max_tokens: i32) -> Result<()> {
    client
        .generate(prompt, max_tokens, |token| {
            print!("{}", token);
            let _ = io::stdout().flush();
        })
        .await
        .context("generation failed")?;
    println!();
    Ok(())
}

async fn chat(client: &mut LlmClient, max_tokens: i32) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let prompt = line.trim();

        if prompt.is_empty() {
            continue;
        }
        if prompt == "exit" || prompt == "quit" {
            break;
        }

        if let Err(e) = stream_reply(client, prompt, max_tokens).await {
            eprintln!("error: {:#}", e);
        }
    }

    Ok(())
}
