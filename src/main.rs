use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use toolrelay::config::{Config, DEFAULT_CONFIG_PATH};
use toolrelay::discovery::format_functions;
use toolrelay::security::Identity;
use toolrelay::services::Orchestrator;
use toolrelay::startup::{self, StartupLogger};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Identity id used for permission checks
    #[arg(long, default_value = "local")]
    identity: String,

    /// Username of the identity
    #[arg(long)]
    username: Option<String>,

    /// Print the status surface as JSON and exit
    #[arg(long)]
    status: bool,

    /// Print the functions the identity may call and exit
    #[arg(long)]
    list_functions: bool,

    /// Execute one function ("server__function") and print the result
    #[arg(long, value_name = "NAME")]
    call: Option<String>,

    /// JSON arguments for --call
    #[arg(long, value_name = "JSON", default_value = "{}", requires = "call")]
    args: String,

    /// Send one message through the bridge and print the reply
    #[arg(long, value_name = "TEXT")]
    ask: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config, cli.log_level.clone()) {
        Ok(config) => config,
        Err(e) => {
            // logging is not configured yet
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "text")?;
            error!("Failed to load configuration from {:?}: {}", cli.config, e);
            return Err(e).context("configuration could not be loaded");
        }
    };

    init_logging(&config.logging.level, &config.logging.format)?;
    startup::display_startup_banner(toolrelay::VERSION);
    StartupLogger::display_startup_info(&config, &cli.config, toolrelay::VERSION);

    let orchestrator = Arc::new(Orchestrator::from_config(config).await?);
    let mut identity = Identity::new(cli.identity.clone());
    if let Some(username) = &cli.username {
        identity = identity.with_username(username.clone());
    }

    orchestrator.start().await;
    StartupLogger::display_ready(&orchestrator.status().await);

    let outcome = run_mode(&cli, &orchestrator, &identity).await;

    orchestrator.shutdown().await;
    outcome
}

async fn run_mode(cli: &Cli, orchestrator: &Arc<Orchestrator>, identity: &Identity) -> Result<()> {
    if cli.status {
        let report = orchestrator.status().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if cli.list_functions {
        println!("{}", format_functions(&orchestrator.functions_for(identity).await));
        return Ok(());
    }

    if let Some(name) = &cli.call {
        let params: Value = serde_json::from_str(&cli.args).context("--args must be a JSON object")?;
        let result = orchestrator.execute_qualified(identity, name, params, true).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if let Some(text) = &cli.ask {
        let reply = orchestrator.handle_message(text, identity).await;
        println!("{}", reply.text);
        return Ok(());
    }

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(orchestrator), cli.config.clone(), cli.log_level.clone());

    run_repl(orchestrator, identity).await
}

/// Line-oriented conversation on stdin until EOF or Ctrl-C
async fn run_repl(orchestrator: &Orchestrator, identity: &Identity) -> Result<()> {
    info!("💬 Reading messages from stdin (Ctrl-C to exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let reply = orchestrator.handle_message(text, identity).await;
                stdout.write_all(reply.text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn spawn_reload_on_hangup(orchestrator: Arc<Orchestrator>, path: PathBuf, log_level: Option<String>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading {:?}", path);
            reload(&orchestrator, &path, log_level.clone()).await;
        }
    });
}

#[cfg(unix)]
async fn reload(orchestrator: &Orchestrator, path: &Path, log_level: Option<String>) {
    match Config::load(path, log_level) {
        Ok(config) => {
            if let Err(e) = orchestrator.reload(config).await {
                error!("Reload failed, keeping the previous configuration: {}", e);
            }
        }
        Err(e) => error!("Reload failed, keeping the previous configuration: {}", e),
    }
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(fmt_layer.json()).try_init()?;
    } else {
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}
