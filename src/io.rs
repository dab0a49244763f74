//! # Byte-Stream Capabilities
//!
//! The bridge core never touches a serial port directly. Each UART is
//! abstracted behind a minimal `ByteSource` / `ByteSink` pair, the only
//! environmental seam, so the protocol engines are plain functions over
//! bytes and every test can run against in-memory streams.
//!
//! The production implementations are channel adapters: a tokio reader
//! task per UART pushes received bytes into an unbounded channel, and the
//! Modbus transmit path hands complete frames to a writer task the same
//! way. The bridge tick drains and fills these channels synchronously.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::error::BridgeError;

/// Non-blocking byte producer side of a UART.
pub trait ByteSource {
    /// True when at least one byte can be read without blocking.
    fn available(&mut self) -> bool;

    /// Take the next byte, or None when the stream is currently empty.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Non-blocking byte consumer side of a UART.
pub trait ByteSink {
    /// Queue bytes for transmission.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Push queued bytes towards the wire.
    fn flush(&mut self) -> Result<(), BridgeError>;
}

/// `ByteSource` over the receiving end of a UART pump channel.
pub struct ChannelByteSource {
    rx: mpsc::UnboundedReceiver<u8>,
    pending: Option<u8>,
}

impl ChannelByteSource {
    pub fn new(rx: mpsc::UnboundedReceiver<u8>) -> Self {
        Self { rx, pending: None }
    }
}

impl ByteSource for ChannelByteSource {
    fn available(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(byte) => {
                self.pending = Some(byte);
                true
            }
            Err(_) => false,
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.pending.take().or_else(|| self.rx.try_recv().ok())
    }
}

/// `ByteSink` over the sending end of a UART pump channel.
///
/// Frames are queued whole; `flush` hands them to the writer task.
pub struct ChannelByteSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    queued: Vec<u8>,
}

impl ChannelByteSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            tx,
            queued: Vec::new(),
        }
    }
}

impl ByteSink for ChannelByteSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.queued.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BridgeError> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let frame = std::mem::take(&mut self.queued);
        self.tx.send(frame).map_err(|_| BridgeError::ChannelClosed)
    }
}

/// In-memory byte source for tests: feed it bytes, the code under test
/// drains them.
#[derive(Debug, Default)]
pub struct MockByteSource {
    data: VecDeque<u8>,
}

impl MockByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.iter().copied().collect(),
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }
}

impl ByteSource for MockByteSource {
    fn available(&mut self) -> bool {
        !self.data.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.data.pop_front()
    }
}

/// In-memory byte sink for tests: captures everything written.
#[derive(Debug, Default)]
pub struct MockByteSink {
    pub written: Vec<u8>,
    pub flushes: usize,
}

impl MockByteSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteSink for MockByteSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BridgeError> {
        self.flushes += 1;
        Ok(())
    }
}
