//! # Rate-Limited Logging
//!
//! A serial link feeding garbage at 2400 bps can produce a resync attempt
//! for every byte. `LogThrottle` caps how often such paths may log so the
//! journal stays readable, and `log_frame_hex` gives frame dumps one
//! consistent shape.

use std::time::Instant;

/// Token-bucket style limiter: at most `cap` messages per `window_ms`.
#[derive(Debug)]
pub struct LogThrottle {
    window_ms: u64,
    cap: u32,
    count: u32,
    t0: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// Returns true when the caller may log; false when throttled.
    pub fn allow(&mut self) -> bool {
        let elapsed_ms = self.t0.elapsed().as_millis() as u64;
        if elapsed_ms > self.window_ms {
            self.t0 = Instant::now();
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.cap
    }
}

/// Log frame bytes at debug level, truncated to keep the journal sane.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" .. ({} bytes total)", data.len())
    } else {
        String::new()
    };
    log::debug!("{prefix}: {}{suffix}", super::hex::format_hex_compact(shown));
}
