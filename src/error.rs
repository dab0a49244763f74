//! # Bridge Error Handling
//!
//! This module defines the BridgeError enum, which represents the different
//! error types that can occur while setting up and running the bridge.
//!
//! Runtime protocol errors are deliberately absent: frame corruption is
//! absorbed by resynchronization, bad DLMS data resets the assembly, and
//! Modbus problems are answered with exception responses. Only conditions
//! that make the bridge unable to run at all surface here.

/// Represents the different error types that can occur in the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates an AES key of the wrong size was provided.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// Indicates a problem with the provided configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Indicates a UART pump channel closed underneath the bridge.
    #[error("Byte channel closed")]
    ChannelClosed,
}
