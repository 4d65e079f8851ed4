//! Broadcast Relay daemon
//!
//! CLI for running the relay and inspecting the chat client.

use broadcast_relay::bootstrap::bootstrap;
use broadcast_relay::browser::ChromePage;
use broadcast_relay::config::Config;
use broadcast_relay::directive::DirectiveParser;
use broadcast_relay::directory::ContactDirectory;
use broadcast_relay::dom::WebChatDom;
use broadcast_relay::engine::RelayEngine;
use broadcast_relay::scheduler::PeriodicTask;
use broadcast_relay::Result;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Broadcast Relay - retype relay-chat directives to named contacts
#[derive(Parser)]
#[command(name = "broadcast-relay")]
#[command(about = "Relay broadcast directives through a web chat client")]
struct Cli {
    /// JSON config file (defaults apply to missing fields)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and relay directives until interrupted
    Run,

    /// List every contact in the contact list
    Contacts,

    /// Check whether a contact exists
    Check {
        /// Exact display name
        name: String,
    },

    /// Parse a directive offline and show its targets and payload
    Parse {
        /// Message text (reads stdin when omitted)
        text: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => cmd_run(&config).await,
        Commands::Contacts => cmd_contacts(&config).await,
        Commands::Check { name } => cmd_check(&config, &name).await,
        Commands::Parse { text } => cmd_parse(&config, text),
        Commands::Config => cmd_config(&config),
    }
}

// ============================================================================
// Commands
// ============================================================================

type ChromeDom = WebChatDom<Arc<ChromePage>>;

/// Launch the browser and wait for an authenticated session
async fn open_session(config: &Config) -> Result<(Arc<ChromePage>, ChromeDom)> {
    let page = Arc::new(ChromePage::launch(config).await?);
    let dom = WebChatDom::new(Arc::clone(&page), config.selectors.clone());

    if let Err(e) = bootstrap(page.as_ref(), dom.clone(), config).await {
        error!(error = %e, "failed to establish chat session");
        if let Err(close_err) = page.close().await {
            error!(error = %close_err, "failed to close browser");
        }
        return Err(e);
    }

    Ok((page, dom))
}

async fn cmd_run(config: &Config) -> Result<()> {
    info!("broadcast relay starting");

    let (page, dom) = open_session(config).await?;
    let engine = Arc::new(RelayEngine::new(config, Arc::clone(&page), dom));
    let relay = engine.start();

    serve_until(relay, tokio::signal::ctrl_c()).await;
    page.close().await
}

/// Keep the relay running until `signal` resolves, then stop it.
/// A failed signal listener still stops the relay.
async fn serve_until<F>(relay: PeriodicTask, signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("shutting down"),
        Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
    }
    relay.shutdown().await;
}

async fn cmd_contacts(config: &Config) -> Result<()> {
    let (page, dom) = open_session(config).await?;

    let directory = ContactDirectory::new(config);
    let listed = directory.list_all(&dom).await;
    page.close().await?;

    let mut names: Vec<String> = listed?.into_iter().collect();
    names.sort();
    for name in &names {
        println!("{}", name);
    }
    println!("\n{} contacts", names.len());

    Ok(())
}

async fn cmd_check(config: &Config, name: &str) -> Result<()> {
    let (page, dom) = open_session(config).await?;

    let directory = ContactDirectory::new(config);
    let exists = directory.exists(&dom, name).await;
    page.close().await?;

    if exists? {
        println!("Contact found: {}", name);
    } else {
        println!("Contact not found: {}", name);
    }

    Ok(())
}

fn cmd_parse(config: &Config, text: Option<String>) -> Result<()> {
    let raw = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let parser = DirectiveParser::from_config(config);
    match parser.parse(&raw) {
        Some(directive) if directive.is_actionable() => {
            println!("Targets:");
            for name in &directive.target_names {
                println!("  {}", name);
            }
            println!("Payload:");
            println!("{}", directive.payload);
        }
        Some(_) => println!("Directive has no targets"),
        None => println!("Not a directive"),
    }

    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_failed_signal_still_stops_relay() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let relay = PeriodicTask::spawn("relay", Duration::from_millis(50), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        let signal = async { Err(std::io::Error::other("signal handler unavailable")) };
        serve_until(relay, signal).await;

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen > 0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }
}
