//! TvLink command-line client.
//!
//! Connects to a display device, pairs if needed, runs one command, and
//! disconnects.  The first run against a new device shows a pairing prompt
//! on the device; the credential it issues is stored next to the config
//! file and reused afterwards.
//!
//! # Usage
//!
//! ```text
//! tvlink [OPTIONS] <COMMAND>
//!
//! Commands:
//!   devices               List devices from discovery
//!   status [--watch N]    Print status snapshots as JSON for N seconds
//!   press <KEY>           Press a remote-control button (HOME, BACK, ...)
//!   text <TEXT>           Type text into the focused field
//!   move <DX> <DY>        Move the pointer
//!   click                 Click the primary pointer button
//!   scroll <DX> <DY>      Scroll
//!
//! Options:
//!   -a, --address <ADDR>      Device address [env: TVLINK_ADDRESS]
//!   -c, --config <PATH>       Config file [env: TVLINK_CONFIG]
//!       --log-level <LEVEL>   Overrides the configured log level
//! ```
//!
//! Without `--address`, the first device reported by discovery is used.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tvlink_client::infrastructure::discovery::{discover_within, ConfiguredDiscovery};
use tvlink_client::infrastructure::network::pointer::PointerState;
use tvlink_client::infrastructure::storage::config::{load_config, load_config_from, ClientConfig};
use tvlink_client::infrastructure::storage::credentials::{CredentialStore, JsonFileStore};
use tvlink_client::RemoteClient;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote control for networked display devices.
#[derive(Debug, Parser)]
#[command(name = "tvlink", about = "Remote control for networked display devices", version)]
struct Cli {
    /// Device address (IP or host name).
    #[arg(short, long, env = "TVLINK_ADDRESS", global = true)]
    address: Option<String>,

    /// Path to the config file; defaults to the platform config directory.
    #[arg(short, long, env = "TVLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List devices from discovery.
    Devices,
    /// Print status snapshots as JSON.
    Status {
        /// Seconds to keep watching after connecting.
        #[arg(long, default_value_t = 10)]
        watch: u64,
    },
    /// Press a remote-control button.
    Press { key: String },
    /// Type text into the focused input field.
    Text { text: String },
    /// Move the pointer by a relative offset.
    Move {
        #[arg(allow_negative_numbers = true)]
        dx: f64,
        #[arg(allow_negative_numbers = true)]
        dy: f64,
    },
    /// Click the primary pointer button.
    Click,
    /// Scroll by a relative offset.
    Scroll {
        #[arg(allow_negative_numbers = true)]
        dx: f64,
        #[arg(allow_negative_numbers = true)]
        dy: f64,
    },
}

impl Cli {
    /// Loads the config file named on the command line, or the default one.
    fn load_config(&self) -> anyhow::Result<ClientConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => load_config().context("failed to load config"),
        }
    }

    /// Filter directive: `--log-level`, then the config, then `info`.
    fn log_filter(&self, config: &ClientConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.log_level.clone())
    }
}

/// Builds the credential store: the configured file, or `credentials.json`
/// beside the default config.
fn credential_store(config: &ClientConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store = match &config.credential_file {
        Some(path) => JsonFileStore::new(path.clone()),
        None => JsonFileStore::at_default_location().context("no location for credentials")?,
    };
    Ok(Arc::new(store))
}

/// Uses `--address` if given, otherwise the first discovered device.
async fn resolve_address(cli: &Cli, config: &ClientConfig) -> anyhow::Result<String> {
    if let Some(address) = &cli.address {
        return Ok(address.clone());
    }
    let discovery = ConfiguredDiscovery::new(config.devices.clone());
    let devices = discover_within(&discovery, config.discovery_timeout()).await?;
    let device = devices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no --address given and no device discovered"))?;
    info!("using discovered device {} ({})", device.name, device.ip);
    Ok(device.ip)
}

/// Waits until the pointer channel is open or `timeout` passes.
async fn wait_for_pointer(client: &RemoteClient, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if client.pointer_state() == PointerState::Open {
            return true;
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    false
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter(&config))),
        )
        .init();

    if let Command::Devices = cli.command {
        let discovery = ConfiguredDiscovery::new(config.devices.clone());
        for device in discover_within(&discovery, config.discovery_timeout()).await? {
            println!("{}\t{}\t{}", device.ip, device.identifier, device.name);
        }
        return Ok(());
    }

    let address = resolve_address(&cli, &config).await?;
    let client = RemoteClient::new(config.clone(), credential_store(&config)?);
    let (tx, mut updates) = mpsc::unbounded_channel();
    client.set_status_listener(tx);

    client
        .connect(&address)
        .await
        .with_context(|| format!("could not connect to {address}"))?;

    let outcome = run_command(&cli.command, &client, &config, &mut updates).await;
    client.disconnect().await;
    outcome
}

async fn run_command(
    command: &Command,
    client: &RemoteClient,
    config: &ClientConfig,
    updates: &mut mpsc::UnboundedReceiver<tvlink_core::StatusSnapshot>,
) -> anyhow::Result<()> {
    match command {
        Command::Devices => Ok(()),
        Command::Status { watch } => {
            println!("{}", serde_json::to_string(&client.status())?);
            let stop = time::sleep(Duration::from_secs(*watch));
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    Some(snapshot) = updates.recv() => println!("{}", serde_json::to_string(&snapshot)?),
                    _ = &mut stop => break,
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok(())
        }
        Command::Press { key } => Ok(client.press_key(key).await?),
        Command::Text { text } => Ok(client.send_text(text).await?),
        Command::Move { dx, dy } => {
            if !wait_for_pointer(client, config.connect_timeout()).await {
                warn!("pointer channel not available; move dropped");
            }
            client.move_pointer(*dx, *dy).await;
            Ok(())
        }
        Command::Click => {
            if !wait_for_pointer(client, config.connect_timeout()).await {
                warn!("pointer channel not available; click dropped");
            }
            client.click().await;
            Ok(())
        }
        Command::Scroll { dx, dy } => {
            if !wait_for_pointer(client, config.connect_timeout()).await {
                warn!("pointer channel not available; scroll dropped");
            }
            client.scroll(*dx, *dy).await;
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
