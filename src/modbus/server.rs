//! # Modbus RTU Server (Slave)
//!
//! Handles the Modbus communication for one slave address, function code
//! 0x03 (Read Holding Registers) only, which is everything a
//! SunSpec-polling inverter needs.
//!
//! The server is ticked every ~16 ms, far coarser than the 3.5-character
//! silent interval the serial line standard uses to delimit frames, so frames are
//! recovered by scanning the rx buffer for a plausible
//! `address | function | ... | crc` shape instead of by timing. A scan
//! mismatch costs exactly one buffered byte, which makes the server
//! self-synchronizing on a noisy line.

use bytes::{BufMut, BytesMut};

use crate::io::{ByteSink, ByteSource};
use crate::util::{log_frame_hex, LogThrottle};

/// Request frame size for the supported function codes: address,
/// function, start hi/lo, count hi/lo, crc lo/hi.
const READ_FRAME_SIZE: usize = 8;

/// A decoded read request (function codes 0x01..=0x04 share this shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRead {
    pub start_address: u16,
    pub address_count: u16,
}

/// Modbus exception codes the server can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalAddress = 0x02,
    IllegalValue = 0x03,
    DeviceFailure = 0x04,
}

/// Handler verdict for one request: register bytes or an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRead {
    result: Result<Vec<u8>, ExceptionCode>,
}

impl ResponseRead {
    /// Successful response carrying raw register bytes (already
    /// big-endian, straight off the SunSpec image).
    pub fn data(bytes: Vec<u8>) -> Self {
        Self { result: Ok(bytes) }
    }

    /// Exception response.
    pub fn exception(code: ExceptionCode) -> Self {
        Self { result: Err(code) }
    }

    pub fn is_exception(&self) -> bool {
        self.result.is_err()
    }

    /// Frame the response without CRC:
    /// `address | function | byte_count | data..` on success,
    /// `address | function|0x80 | exception` on error.
    fn into_frame(self, address: u8, function_code: u8) -> BytesMut {
        let mut frame = BytesMut::with_capacity(3 + 2 * 125);
        frame.put_u8(address);
        match self.result {
            Ok(data) => {
                frame.put_u8(function_code);
                frame.put_u8(data.len() as u8);
                frame.put_slice(&data);
            }
            Err(code) => {
                frame.put_u8(function_code | 0x80);
                frame.put_u8(code as u8);
            }
        }
        frame
    }
}

/// Modbus RTU slave for one configured address.
pub struct ModbusServer {
    address: u8,
    rx_buffer: crate::util::IoBuffer,
    warn_throttle: LogThrottle,
}

enum ScanOutcome {
    NeedMoreData,
    Consume(usize),
    Request {
        function_code: u8,
        request: RequestRead,
        frame_size: usize,
    },
}

impl ModbusServer {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            rx_buffer: crate::util::IoBuffer::with_capacity(64),
            warn_throttle: LogThrottle::new(1000, 5),
        }
    }

    /// Drain the UART, answer every complete addressed request.
    ///
    /// `on_read` maps a request to register bytes (or an exception); the
    /// framed response is transmitted synchronously within this tick.
    pub fn tick<F>(
        &mut self,
        source: &mut dyn ByteSource,
        sink: &mut dyn ByteSink,
        mut on_read: F,
    ) where
        F: FnMut(u8, &RequestRead) -> ResponseRead,
    {
        while source.available() {
            match source.read_byte() {
                Some(byte) => self.rx_buffer.write_byte(byte),
                None => break,
            }
        }

        while !self.rx_buffer.is_empty() {
            match self.scan_request() {
                ScanOutcome::NeedMoreData => break,
                ScanOutcome::Consume(count) => self.rx_buffer.discard(count),
                ScanOutcome::Request {
                    function_code,
                    request,
                    frame_size,
                } => {
                    self.rx_buffer.discard(frame_size);
                    let response = on_read(function_code, &request);
                    self.send(response.into_frame(self.address, function_code), sink);
                }
            }
        }
    }

    /// Append the CRC and transmit one frame.
    fn send(&mut self, mut frame: BytesMut, sink: &mut dyn ByteSink) {
        let crc = crc16(&frame);
        frame.put_u16_le(crc);
        log_frame_hex("modbus: tx frame", &frame);
        if let Err(err) = sink.write(&frame).and_then(|()| sink.flush()) {
            log::error!("modbus: failed to transmit response: {err}");
        }
    }

    /// Inspect the buffer front for one frame.
    fn scan_request(&mut self) -> ScanOutcome {
        // At least address | function_code before anything can be judged.
        if self.rx_buffer.len() < 2 {
            return ScanOutcome::NeedMoreData;
        }

        let function_code = self.rx_buffer.byte_at(1).unwrap_or(0);
        let frame_size = frame_size_for(function_code);
        if frame_size == 0 {
            if self.warn_throttle.allow() {
                log::warn!("modbus: function code {function_code:#04x} not supported or invalid frame");
            }
            return ScanOutcome::Consume(1);
        }

        if self.rx_buffer.len() < frame_size {
            return ScanOutcome::NeedMoreData;
        }

        let frame = self.rx_buffer.peek_range(0, frame_size);
        let computed_crc = crc16(&frame[..frame_size - 2]);
        let received_crc = u16::from_le_bytes([frame[frame_size - 2], frame[frame_size - 1]]);
        if computed_crc != received_crc {
            if self.warn_throttle.allow() {
                log::warn!(
                    "modbus: invalid crc, computed {computed_crc:#06x}, received {received_crc:#06x}"
                );
            }
            return ScanOutcome::Consume(1);
        }

        if frame[0] != self.address {
            log::debug!("modbus: frame for address {}, not ours ({})", frame[0], self.address);
            return ScanOutcome::Consume(frame_size);
        }

        let request = RequestRead {
            start_address: u16::from_be_bytes([frame[2], frame[3]]),
            address_count: u16::from_be_bytes([frame[4], frame[5]]),
        };
        ScanOutcome::Request {
            function_code,
            request,
            frame_size,
        }
    }
}

/// Frame size for a request with the given function code; 0 when the
/// code is not one this server can frame.
fn frame_size_for(function_code: u8) -> usize {
    if (0x01..=0x04).contains(&function_code) {
        READ_FRAME_SIZE
    } else {
        0
    }
}

/// CRC-16/Modbus: polynomial 0xA001 (reflected), init 0xFFFF, LSB first,
/// no final xor. Transmitted low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
