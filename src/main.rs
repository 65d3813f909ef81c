//! # Procon Bridge
//!
//! Impersonate a wired Switch Pro Controller over USB, fed by a host over UART.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse arguments, load and validate configuration
//!    - Set up logging (stdout, optionally daily log files)
//!    - Generate a device identity and build the flash image
//!    - Open the UART and the HID gadget
//!
//! 2. **Main Loop** (every 1ms)
//!    - Service USB events, decode serial input, tick the protocol engine
//!    - Handle Ctrl+C for graceful shutdown
//!
//! ```bash
//! sudo procon-bridge --config /etc/procon-bridge.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use procon_bridge::bridge::Bridge;
use procon_bridge::config::{Config, AUTO_DETECT};
use procon_bridge::controller::calibration::CalibrationStore;
use procon_bridge::controller::identity::DeviceIdentity;
use procon_bridge::hid::engine::ProtocolEngine;
use procon_bridge::link::decoder::FrameDecoder;
use procon_bridge::rumble::RumbleForwarder;
use procon_bridge::serial::UartLink;
use procon_bridge::usb::gadget::{self, HidGadget};

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main loop period
const LOOP_PERIOD_MS: u64 = 1;

/// Prefix of daily log files
const LOG_FILE_PREFIX: &str = "procon-bridge.log";

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// UART device, overrides the configuration ("auto" to probe)
    #[arg(short, long)]
    port: Option<String>,

    /// UART baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,
}

fn init_logging(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Load the configuration file, falling back to defaults only when the
/// default path is absent. Command-line overrides are applied afterwards.
fn load_config(cli: &Cli) -> Result<(Config, bool)> {
    let mut used_defaults = false;
    let mut config = if cli.config.exists() || cli.config != Path::new(DEFAULT_CONFIG_PATH) {
        Config::load(&cli.config).with_context(|| format!("Failed to load {}", cli.config.display()))?
    } else {
        used_defaults = true;
        Config::default()
    };

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    config.validate().context("Invalid configuration")?;

    Ok((config, used_defaults))
}

fn open_uart(config: &Config) -> Result<UartLink> {
    let link = if config.serial.port == AUTO_DETECT {
        UartLink::open(config.serial.baud_rate)?
    } else {
        UartLink::open_with_paths(&[config.serial.port.as_str()], config.serial.baud_rate)?
    };
    Ok(link)
}

async fn open_gadget(config: &Config) -> Result<HidGadget> {
    let udc = if config.usb.udc.is_empty() {
        gadget::find_udc(Path::new(gadget::UDC_CLASS_DIR)).await?
    } else {
        config.usb.udc.clone()
    };
    info!("Using UDC {}", udc);

    if config.usb.configure_gadget {
        let path = gadget::configure_gadget(Path::new(gadget::CONFIGFS_ROOT), &udc).await?;
        info!("Gadget configured at {}", path.display());
    }

    let hid = HidGadget::start(
        Path::new(&config.usb.hidg_device),
        gadget::udc_state_path(&udc),
        Duration::from_millis(config.usb.udc_poll_ms),
    )
    .await?;
    Ok(hid)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, used_defaults) = load_config(&cli)?;
    let _log_guard = init_logging(config.logging.log_dir.as_deref());

    info!("Procon Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    if used_defaults {
        warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
    }

    let identity = DeviceIdentity::generate(&mut rand::rng());
    info!("Device identity: {}", identity);
    let store = CalibrationStore::new(&config.colors.to_controller_colors());
    let engine = ProtocolEngine::new(
        identity,
        store,
        config.motion.to_motion_scale(),
        config.usb.report_timing(),
    );

    let uart = open_uart(&config)?;
    info!("UART opened at: {}", uart.device_path());
    let (mut serial_chunks, uart_writer, serial_task) = uart.start();

    let HidGadget { sink, mut events, tasks } = open_gadget(&config).await?;

    let mut bridge = Bridge::new(
        engine,
        FrameDecoder::new(config.serial.idle_timeout_ms),
        sink,
        RumbleForwarder::new(uart_writer),
    );

    let mut ticker = interval(Duration::from_millis(LOOP_PERIOD_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();

    info!("Bridge running, press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Millisecond clock wraps after ~49 days; all consumers use wrapping math
                let now_ms = started.elapsed().as_millis() as u32;
                bridge.step(&mut events, &mut serial_chunks, now_ms).await;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let stats = bridge.engine().stats();
    info!(
        "Reports sent: {}, replies sent: {}, rumble frames: {}",
        stats.reports_sent,
        stats.replies_sent,
        bridge.rumble().sent()
    );
    tasks.shutdown();
    serial_task.abort();

    Ok(())
}
