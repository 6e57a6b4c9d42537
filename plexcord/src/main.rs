//! plexcord - show what you're playing on Plex as Discord Rich Presence
//!
//! Runs one alert listener per configured (account, server) pair until
//! Ctrl-C.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/plexcord/config.json (~/.config/plexcord/config.json)
//! - Logs: $XDG_STATE_HOME/plexcord/plexcord.log (~/.local/state/plexcord/plexcord.log)

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plexcord_core::activity::fetch_images_url;
use plexcord_core::config::{ConfigStore, ServerConfig};
use plexcord_core::plex::PlexAccount;
use plexcord_core::{
    AlertListener, Config, ConnectionState, ListenerHandle, ListenerSettings, PresencePublisher,
    ServerDirectory,
};

/// Timeout for fetching the image lookup URL
const IMAGES_URL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "plexcord")]
#[command(about = "Show Plex playback as Discord Rich Presence")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/plexcord/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for playback and update Discord (default)
    Run,

    /// Show configured users and servers
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::config_path);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(&config_path, args.verbose),
        Command::Status => cmd_status(&config_path),
    }
}

fn print_setup_hint(config_path: &Path) {
    println!("No users configured. Add a Plex account to {}:", config_path.display());
    println!();
    println!("  \"users\": [{{");
    println!("  \t\"token\": \"<your Plex token>\",");
    println!("  \t\"servers\": [{{ \"name\": \"<server name>\" }}]");
    println!("  }}]");
}

/// Load the config with a stderr subscriber in place, so problems with the
/// file are reported before file logging is configured from it.
fn open_config(config_path: &Path) -> ConfigStore {
    tracing::subscriber::with_default(plexcord_core::logging::bootstrap_subscriber(), || {
        ConfigStore::open(config_path)
    })
}

fn cmd_run(config_path: &Path, verbose: bool) -> Result<()> {
    let store = Arc::new(open_config(config_path));
    let config = store.snapshot();

    if config.users.is_empty() {
        print_setup_hint(config_path);
        return Ok(());
    }

    let _log_guard = plexcord_core::logging::init(&config.logging, verbose)
        .context("failed to initialize logging")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run(store))
}

async fn run(store: Arc<ConfigStore>) -> Result<()> {
    let config = store.snapshot();
    let images_url = images_url().await;

    let mut handles = Vec::new();
    for (index, user) in config.users.iter().enumerate() {
        let account: Arc<dyn ServerDirectory> = match PlexAccount::new(user.token.clone()) {
            Ok(account) => Arc::new(account),
            Err(e) => {
                tracing::error!(user = index + 1, error = %e, "Skipping user");
                continue;
            }
        };

        for server in &user.servers {
            let handle = AlertListener::spawn(
                ListenerSettings {
                    server: server.clone(),
                    images_url: images_url.clone(),
                },
                account.clone(),
                presence_publisher()?,
                store.clone(),
            );
            tracing::info!(server = %server.name, id = handle.id(), "Started listener");
            handles.push(handle);
        }
    }

    if handles.is_empty() {
        tracing::warn!("No servers configured, nothing to do");
        return Ok(());
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
        }
        _ = all_stopped(&handles) => {
            tracing::warn!("All listeners stopped");
        }
    }

    for handle in &handles {
        handle.stop();
    }
    for handle in handles {
        let id = handle.id().to_string();
        if let Err(e) = handle.join().await {
            tracing::debug!(id = %id, error = %e, "Listener ended with error");
        }
    }

    Ok(())
}

/// Image lookup base URL, or `None` to fall back to static assets
async fn images_url() -> Option<String> {
    let client = match reqwest::Client::builder()
        .timeout(IMAGES_URL_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create HTTP client");
            return None;
        }
    };

    match fetch_images_url(&client).await {
        Ok(url) => {
            tracing::debug!(url = %url, "Using image lookup URL");
            Some(url)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch image lookup URL, using static images");
            None
        }
    }
}

async fn all_stopped(handles: &[ListenerHandle]) {
    for handle in handles {
        let mut state = handle.watch_state();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Stopped)
            .await;
    }
}

#[cfg(unix)]
fn presence_publisher() -> Result<Box<dyn PresencePublisher>> {
    use plexcord_core::discord::{DiscordIpc, CLIENT_ID};
    Ok(Box::new(DiscordIpc::new(CLIENT_ID)))
}

#[cfg(not(unix))]
fn presence_publisher() -> Result<Box<dyn PresencePublisher>> {
    anyhow::bail!("Discord IPC is only supported on Unix platforms")
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = open_config(config_path).snapshot();

    println!("plexcord Configuration");
    println!("======================");
    println!();
    println!("Config file:     {}", config_path.display());
    println!("Log file:        {}", Config::log_path().display());
    println!("Debug logging:   {}", config.logging.debug);
    println!("Remaining time:  {}", config.display.use_remaining_time);
    println!();

    if config.users.is_empty() {
        print_setup_hint(config_path);
        return Ok(());
    }

    for (index, user) in config.users.iter().enumerate() {
        println!("User {}", index + 1);
        println!("  Token:         {}", mask_token(&user.token));

        if user.servers.is_empty() {
            println!("  Servers:       <none>");
            continue;
        }
        for server in &user.servers {
            print_server(server);
        }
    }

    Ok(())
}

fn print_server(server: &ServerConfig) {
    println!("  Server:        {}", server.name);
    println!(
        "    Listen for:  {}",
        server
            .listen_for_user
            .as_deref()
            .unwrap_or("<account owner>")
    );
    if let Some(blacklist) = &server.blacklisted_libraries {
        println!("    Blacklist:   {}", join_names(blacklist));
    }
    if let Some(whitelist) = &server.whitelisted_libraries {
        println!("    Whitelist:   {}", join_names(whitelist));
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// First four characters, the rest hidden
fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "<not set>".to_string();
    }
    let visible: String = token.chars().take(4).collect();
    format!("{}****", visible)
}
