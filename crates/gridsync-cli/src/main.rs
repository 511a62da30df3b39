//! gridsync - headless host for the admin console's list screens.
//!
//! Loads configuration, mounts a screen against the REST backend and either
//! prints one page or runs a line-driven session on stdin.

mod console;
mod screens;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use gridsync_core::{AppConfig, QueryPatch, ScreenSpec};
use gridsync_engine::{LocalGrid, ResponseOutcome, ScreenSession, SessionEvent};
use gridsync_rest::RestSource;

use crate::console::{Command, Console};

// =============================================================================
// Command line
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "gridsync", version, about = "Headless host for the admin console's list screens")]
struct Cli {
    /// Config file [default: <config dir>/gridsync/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log filter, e.g. `gridsync=debug` [default: $RUST_LOG or gridsync=info]
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List the available screens
    Screens,
    /// Fetch one page of a screen and print it
    Fetch(FetchArgs),
    /// Open an interactive session on a screen
    Session {
        /// Screen name, see `gridsync screens`
        screen: String,
    },
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Screen name, see `gridsync screens`
    screen: String,

    /// Search text
    #[arg(long)]
    search: Option<String>,

    /// Filter on a server key; repeatable
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// 1-based page
    #[arg(long)]
    page: Option<u32>,

    /// Rows per page
    #[arg(long)]
    limit: Option<u32>,

    /// Sort column
    #[arg(long, value_name = "COLUMN[:desc]")]
    sort: Option<String>,

    /// Print the page as JSON
    #[arg(long)]
    json: bool,
}

// =============================================================================
// Setup
// =============================================================================

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridsync=info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>, base_url: Option<String>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    if let Some(url) = base_url {
        config.api.base_url = url;
    }
    Ok(config)
}

fn open_screen(
    config: &AppConfig,
    name: &str,
    seed: impl FnOnce(&ScreenSpec) -> Result<Option<QueryPatch>>,
) -> Result<Console<RestSource<Value>>> {
    let screen = screens::find(name)
        .ok_or_else(|| anyhow!("unknown screen {name:?}, see `gridsync screens`"))?;

    let mut api = config.api.clone();
    api.page_unit = screen.page_unit;
    let source = Arc::new(RestSource::new(&api, &screen.spec.resource)?);
    let seed = seed(&screen.spec)?;

    tracing::info!(screen = name, endpoint = %source.endpoint(), "opening screen");
    Ok(ScreenSession::open(
        screen.spec,
        config.engine.clone(),
        LocalGrid::new(),
        source,
        seed,
    ))
}

// =============================================================================
// Commands
// =============================================================================

async fn fetch(config: &AppConfig, args: FetchArgs) -> Result<()> {
    let mut session = open_screen(config, &args.screen, |spec| {
        let patch = console::seed_patch(
            spec,
            args.search.as_deref(),
            &args.filters,
            args.page,
            args.limit,
            args.sort.as_deref(),
        )?;
        Ok((!patch.is_empty()).then_some(patch))
    })?;

    session.run_until_idle().await;

    let reconciler = session.reconciler();
    if let Some(err) = reconciler.error() {
        return Err(anyhow!("{err}"));
    }
    if args.json {
        println!("{}", console::render_json(reconciler)?);
    } else {
        println!("{}", console::render(reconciler));
    }
    Ok(())
}

async fn session(config: &AppConfig, name: &str) -> Result<()> {
    let mut session = open_screen(config, name, |_| Ok(None))?;
    session.run_until_idle().await;
    println!("{}", console::render(session.reconciler()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Some(text) = console::apply(&mut session, command) {
                            println!("{text}");
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
            event = session.step() => {
                if let SessionEvent::Response {
                    outcome: ResponseOutcome::Applied | ResponseOutcome::Failed,
                    ..
                } = event
                {
                    println!("{}", console::render(session.reconciler()));
                }
            }
        }
    }

    session.unmount();
    tracing::info!(screen = name, "session closed");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Cmd::Screens => {
            print!("{}", screens::listing(&screens::catalog()));
            Ok(())
        }
        Cmd::Fetch(args) => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            fetch(&config, args).await
        }
        Cmd::Session { screen } => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            session(&config, &screen).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_args() {
        let cli = Cli::try_parse_from([
            "gridsync",
            "fetch",
            "orders",
            "--filter",
            "status=shipped,pending",
            "--filter",
            "payment_method=upi",
            "--sort",
            "total:desc",
            "--base-url",
            "localhost:9000",
        ])
        .unwrap();

        assert_eq!(cli.base_url.as_deref(), Some("localhost:9000"));
        let Cmd::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.screen, "orders");
        assert_eq!(args.filters.len(), 2);
        assert_eq!(args.sort.as_deref(), Some("total:desc"));
        assert!(!args.json);
    }
}
