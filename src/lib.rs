//! # smartmeter-rs - DLMS/COSEM Smart Meter to SunSpec Modbus Bridge
//!
//! The smartmeter-rs crate turns the encrypted DLMS/COSEM telemetry of a
//! residential electricity meter into a SunSpec-compliant Modbus RTU
//! slave, so an inverter polling for a "3-phase float meter (model 213)"
//! sees a standard meter even though the upstream device speaks a
//! completely different protocol.
//!
//! ## Features
//!
//! - Synchronize on M-Bus long frames in an arbitrary byte stream
//! - Reassemble and decrypt general-glo-ciphered DLMS APDUs (AES-128)
//! - Decode OBIS-coded measurements into typed meter snapshots
//! - Maintain a SunSpec model-213 register image in wire byte order
//! - Answer Modbus function 0x03 reads with CRC-validated framing
//! - Publish measurements into configurable sinks
//!
//! ## Usage
//!
//! To use the smartmeter-rs crate in your Rust project, add the following
//! to your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! smartmeter-rs = "0.1.0"
//! ```
//!
//! Then wire the bridge to two byte streams and tick it:
//!
//! ```rust
//! use smartmeter_rs::{AesKey, Bridge, Sinks};
//! use smartmeter_rs::io::{MockByteSink, MockByteSource};
//!
//! let key = AesKey::from_hex("000102030405060708090A0B0C0D0E0F").unwrap();
//! let mut bridge = Bridge::new(key, 240, Sinks::new());
//!
//! let mut meter_uart = MockByteSource::new();
//! let mut inverter_rx = MockByteSource::new();
//! let mut inverter_tx = MockByteSink::new();
//! bridge.tick(&mut meter_uart, &mut inverter_rx, &mut inverter_tx);
//! ```

pub mod bridge;
pub mod constants;
pub mod dlms;
pub mod error;
pub mod io;
pub mod logging;
pub mod mbus;
pub mod modbus;
pub mod sunspec;
pub mod util;

pub use bridge::{Bridge, LedColor, StatusLed, TimeSource};
pub use dlms::{AesKey, DlmsDecoder, MeterData, Sinks};
pub use error::BridgeError;
pub use logging::{init_logger, log_debug, log_error, log_info, log_warn};
pub use mbus::MbusFramer;
pub use modbus::{ExceptionCode, ModbusServer, RequestRead, ResponseRead};
pub use sunspec::SunSpecImage;
