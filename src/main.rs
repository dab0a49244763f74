use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;

use smartmeter_rs::bridge::TimeSource;
use smartmeter_rs::constants::{DEFAULT_MODBUS_ADDRESS, TICK_INTERVAL_MS};
use smartmeter_rs::io::{ChannelByteSink, ChannelByteSource};
use smartmeter_rs::{init_logger, log_info, AesKey, Bridge, BridgeError, Sinks};

#[derive(Parser)]
#[command(name = "smartmeter-cli")]
#[command(about = "DLMS/COSEM smart-meter to SunSpec Modbus RTU bridge")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device of the meter's M-Bus link
    #[arg(long)]
    mbus_port: Option<String>,

    /// Baud rate of the M-Bus link
    #[arg(long)]
    mbus_baud: Option<u32>,

    /// Serial device of the inverter's Modbus RTU link
    #[arg(long)]
    modbus_port: Option<String>,

    /// Baud rate of the Modbus link
    #[arg(long)]
    modbus_baud: Option<u32>,

    /// AES-128 meter key as 32 hex characters
    #[arg(long)]
    key: Option<String>,

    /// Modbus slave address served by the bridge
    #[arg(long)]
    modbus_address: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    mbus_port: Option<String>,
    mbus_baud: Option<u32>,
    modbus_port: Option<String>,
    modbus_baud: Option<u32>,
    key: Option<String>,
    modbus_address: Option<u8>,
    invert_current_direction: Option<bool>,
}

/// Fully resolved runtime configuration.
struct BridgeConfig {
    mbus_port: String,
    mbus_baud: u32,
    modbus_port: String,
    modbus_baud: u32,
    key: AesKey,
    modbus_address: u8,
    invert_current_direction: bool,
}

impl BridgeConfig {
    fn resolve(cli: Cli) -> Result<Self, BridgeError> {
        let file: FileConfig = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| BridgeError::ConfigError(format!("{}: {e}", path.display())))?;
                serde_json::from_str(&text)
                    .map_err(|e| BridgeError::ConfigError(format!("{}: {e}", path.display())))?
            }
            None => FileConfig::default(),
        };

        let require = |name: &str, value: Option<String>| {
            value.ok_or_else(|| BridgeError::ConfigError(format!("missing required option: {name}")))
        };
        let key_hex = require("key", cli.key.or(file.key))?;

        Ok(Self {
            mbus_port: require("mbus-port", cli.mbus_port.or(file.mbus_port))?,
            mbus_baud: cli.mbus_baud.or(file.mbus_baud).unwrap_or(2400),
            modbus_port: require("modbus-port", cli.modbus_port.or(file.modbus_port))?,
            modbus_baud: cli.modbus_baud.or(file.modbus_baud).unwrap_or(9600),
            key: AesKey::from_hex(&key_hex)?,
            modbus_address: cli
                .modbus_address
                .or(file.modbus_address)
                .unwrap_or(DEFAULT_MODBUS_ADDRESS),
            invert_current_direction: file.invert_current_direction.unwrap_or(true),
        })
    }
}

/// Clock backed by the host's (NTP-disciplined) system time.
struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Option<NaiveDateTime> {
        Some(chrono::Local::now().naive_local())
    }
}

/// Sinks that mirror every published measurement into the log.
fn logging_sinks() -> Sinks {
    fn sink(name: &'static str) -> Option<Box<dyn smartmeter_rs::dlms::MeasurementSink>> {
        Some(Box::new(move |value: f64| {
            log::debug!("meter: {name} = {value}");
        }))
    }
    Sinks {
        voltage_l1: sink("voltage_l1"),
        voltage_l2: sink("voltage_l2"),
        voltage_l3: sink("voltage_l3"),
        current_l1: sink("current_l1"),
        current_l2: sink("current_l2"),
        current_l3: sink("current_l3"),
        active_power_plus: sink("active_power_plus"),
        active_power_minus: sink("active_power_minus"),
        active_energy_plus: sink("active_energy_plus"),
        active_energy_minus: sink("active_energy_minus"),
        reactive_energy_plus: sink("reactive_energy_plus"),
        reactive_energy_minus: sink("reactive_energy_minus"),
        timestamp: Some(Box::new(|value: &str| {
            log::debug!("meter: timestamp = {value}");
        })),
    }
}

/// Spawn a task that pumps a serial reader into a byte channel.
fn spawn_uart_reader<R>(mut reader: R, label: &'static str) -> ChannelByteSource
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut buffer = [0u8; 256];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => {
                    log::error!("{label}: serial stream closed");
                    break;
                }
                Ok(n) => {
                    for byte in &buffer[..n] {
                        if tx.send(*byte).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    log::error!("{label}: serial read failed: {err}");
                    break;
                }
            }
        }
    });
    ChannelByteSource::new(rx)
}

/// Spawn a task that writes queued frames to a serial writer.
fn spawn_uart_writer<W>(mut writer: W, label: &'static str) -> ChannelByteSink
where
    W: AsyncWriteExt + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = writer.write_all(&frame).await {
                log::error!("{label}: serial write failed: {err}");
                break;
            }
            if let Err(err) = writer.flush().await {
                log::error!("{label}: serial flush failed: {err}");
                break;
            }
        }
    });
    ChannelByteSink::new(tx)
}

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    init_logger();

    let config = BridgeConfig::resolve(Cli::parse())?;

    let mbus_stream = tokio_serial::new(&config.mbus_port, config.mbus_baud)
        .open_native_async()
        .map_err(|e| BridgeError::SerialPortError(format!("{}: {e}", config.mbus_port)))?;
    let modbus_stream = tokio_serial::new(&config.modbus_port, config.modbus_baud)
        .open_native_async()
        .map_err(|e| BridgeError::SerialPortError(format!("{}: {e}", config.modbus_port)))?;

    log_info(&format!(
        "bridge started: mbus on {} @ {}, modbus on {} @ {}, slave address {}",
        config.mbus_port,
        config.mbus_baud,
        config.modbus_port,
        config.modbus_baud,
        config.modbus_address
    ));

    let mut mbus_source = spawn_uart_reader(mbus_stream, "mbus");
    let (modbus_reader, modbus_writer) = tokio::io::split(modbus_stream);
    let mut modbus_source = spawn_uart_reader(modbus_reader, "modbus");
    let mut modbus_sink = spawn_uart_writer(modbus_writer, "modbus");

    let mut bridge = Bridge::new(config.key, config.modbus_address, logging_sinks())
        .with_time_source(Box::new(SystemTimeSource))
        .with_current_inversion(config.invert_current_direction);

    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bridge.tick(&mut mbus_source, &mut modbus_source, &mut modbus_sink);
            }
            _ = tokio::signal::ctrl_c() => {
                log_info("shutting down");
                break;
            }
        }
    }

    Ok(())
}
