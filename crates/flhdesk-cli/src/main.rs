//! FLH desk command-line tool.
//!
//! Wires the BLE transport into the desk controller and maps subcommands
//! onto the exposed desk operations:
//!
//! ```text
//! flhdesk scan                 # list nearby BLE devices
//! flhdesk --address E7:… up    # nudge the desk upwards
//! flhdesk height 110           # auto-move to 110 cm
//! flhdesk memory 2             # recall preset M2
//! flhdesk watch                # stream state changes until Ctrl-C
//! ```
//!
//! The desk address and tuning knobs come from the TOML config file (see
//! [`config`]); `--address` overrides the file.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flhdesk_core::MemorySlot;
use flhdesk_link::transport::BleTransport;
use flhdesk_link::{DeskController, DeskLinkConfig, DeskTransport};

#[derive(Debug, Parser)]
#[command(name = "flhdesk", about = "Control an FLH height-adjustable desk over BLE")]
struct Cli {
    /// Desk Bluetooth address (overrides the config file).
    #[arg(long, global = true)]
    address: Option<String>,

    /// Path to an alternative config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan for nearby BLE devices.
    Scan {
        /// Scan duration in seconds.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Move the desk up.
    Up,
    /// Move the desk down.
    Down,
    /// Stop desk movement.
    Stop,
    /// Auto-move to a height in centimetres.
    Height { cm: f64 },
    /// Cancel an in-progress auto-move.
    Cancel,
    /// Move to a memory preset (1-4).
    Memory { slot: u8 },
    /// Save the current height to a memory preset (1-4).
    Save { slot: u8 },
    /// Stay connected and print desk state changes until Ctrl-C.
    Watch,
    /// Persist settings to the config file.
    Configure {
        /// Desk Bluetooth address to store.
        #[arg(long)]
        set_address: Option<String>,
        /// Movement sensitivity (0-8) to store.
        #[arg(long)]
        set_sensitivity: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let cfg = config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone())),
        )
        .init();

    match cli.command {
        Command::Scan { seconds } => return scan(seconds).await,
        Command::Configure {
            set_address,
            set_sensitivity,
        } => {
            let mut updated = cfg.clone();
            if let Some(address) = set_address {
                updated.address = Some(address);
            }
            if let Some(sensitivity) = set_sensitivity {
                updated.sensitivity = sensitivity.min(8);
            }
            config::save(&updated, &config_path)?;
            println!("wrote {}", config_path.display());
            return Ok(());
        }
        _ => {}
    }

    let address = cli
        .address
        .clone()
        .or_else(|| cfg.address.clone())
        .context("no desk address: pass --address or set `address` in the config file")?;

    let transport = Arc::new(BleTransport::new().await?);
    let mut link_cfg = DeskLinkConfig::new(&address);
    link_cfg.reconnect.max_attempts = cfg.reconnect_attempts;
    link_cfg.reconnect.delay = Duration::from_secs(cfg.reconnect_delay_secs);

    let controller = DeskController::new(transport as Arc<dyn DeskTransport>, link_cfg);
    controller.set_sensitivity(cfg.sensitivity as i16);

    info!(%address, "connecting");
    controller.connect().await?;

    match cli.command {
        Command::Up => controller.move_up().await?,
        Command::Down => controller.move_down().await?,
        Command::Stop => controller.stop().await?,
        Command::Height { cm } => controller.move_to_height(cm).await?,
        Command::Cancel => controller.stop_auto_move().await?,
        Command::Memory { slot } => {
            controller.move_to_memory(parse_slot(slot)?).await?;
        }
        Command::Save { slot } => {
            controller.save_memory(parse_slot(slot)?).await?;
        }
        Command::Watch => {
            watch(&controller).await?;
            controller.shutdown().await;
            return Ok(());
        }
        Command::Scan { .. } | Command::Configure { .. } => unreachable!("handled above"),
    }

    // Give the desk a moment to report back before printing the snapshot.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = controller.desk_state();
    println!(
        "height {:.1} cm  ({:.0}% of {:.0}-{:.0} cm)",
        state.height_cm(),
        state.position_percent(),
        state.min_height_cm(),
        state.max_height_cm(),
    );

    controller.shutdown().await;
    Ok(())
}

fn parse_slot(slot: u8) -> anyhow::Result<MemorySlot> {
    MemorySlot::try_from(slot).map_err(|bad| anyhow!("memory slot must be 1-4, got {bad}"))
}

/// Prints every state change until Ctrl-C.
async fn watch(controller: &DeskController) -> anyhow::Result<()> {
    let handle = controller.subscribe(|state| {
        println!(
            "height {:>6.1} cm  ({:>3.0}%)  connected: {}",
            state.height_cm(),
            state.position_percent(),
            state.is_connected,
        );
    });

    println!("watching desk state; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    controller.unsubscribe(handle);
    Ok(())
}

/// Lists every peripheral the adapter can see.
async fn scan(seconds: u64) -> anyhow::Result<()> {
    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
    use btleplug::platform::Manager;

    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .context("no bluetooth adapter found")?;

    println!("scanning for {seconds} s...");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    adapter.stop_scan().await?;

    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "(unknown)".to_string());
            let rssi = props
                .rssi
                .map(|r| format!("{r} dBm"))
                .unwrap_or_else(|| "-".to_string());
            println!("{}  {:>8}  {}", peripheral.address(), rssi, name);
        }
    }
    Ok(())
}
