//! smsgate-agent - device-side SMS dispatch agent.
//!
//! Connects out to the task server over WebSocket, executes received
//! tasks through the configured send command and reports outcomes
//! back.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smsgate_agent::{Agent, AgentConfig, CommandSender, StatusSignal};

#[derive(Parser)]
#[command(name = "smsgate-agent")]
#[command(about = "Device-side SMS dispatch agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/smsgate/agent.toml")]
        config: PathBuf,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "/etc/smsgate/agent.toml")]
        output: PathBuf,

        /// Task server URL
        #[arg(long, default_value = "wss://localhost:8443/agent")]
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("smsgate_agent=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_agent(&config).await?,
        Commands::InitConfig { output, endpoint } => init_config(&output, endpoint)?,
    }

    Ok(())
}

async fn run_agent(config_path: &Path) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting smsgate-agent");

    let config = AgentConfig::from_file(config_path)?;
    info!(endpoint = %config.endpoint, "loaded config");

    let sender = CommandSender::new(&config.send_command)?;
    let agent = Agent::new(sender)
        .with_backoff(config.backoff_config())
        .with_ping_interval(config.ping_interval());

    let channels = match agent.start(&config.endpoint) {
        Ok(channels) => channels,
        Err(e) => {
            error!(error = %e, "could not start session");
            anyhow::bail!("{e}");
        }
    };
    let mut logs = channels.logs;
    let mut status = channels.status;

    let log_task = tokio::spawn(async move {
        while let Some(event) = logs.recv().await {
            info!("{}", event.text);
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                agent.stop();
            }
            signal = status.recv() => match signal {
                Some(StatusSignal::Stopped) | None => break,
                Some(signal) => info!(status = ?signal, "session status"),
            }
        }
    }

    log_task.abort();
    info!("agent stopped");
    Ok(())
}

fn init_config(output: &Path, endpoint: String) -> anyhow::Result<()> {
    let config = AgentConfig::sample(endpoint);
    config.save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the file to set your send command, then run:");
    println!("  smsgate-agent run --config {}", output.display());

    Ok(())
}
