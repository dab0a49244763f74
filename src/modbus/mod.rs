//! # Modbus RTU Server
//!
//! The inverter-facing side of the bridge: frames requests out of the
//! second UART, validates CRC-16, and answers function 0x03 reads from
//! the SunSpec register image through a caller-supplied handler.

pub mod server;

pub use server::{crc16, ExceptionCode, ModbusServer, RequestRead, ResponseRead};
