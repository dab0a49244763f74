//! # Status LED Blinking
//!
//! The bridge signals decode activity on an RGB status LED: green for a
//! decoded notification, red for a parse error. The hardware driver is an
//! external collaborator behind the [`StatusLed`] capability; this module
//! only times the blink.

use crate::constants::BLINK_OFF_COUNT;

/// Colors the status LED can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off,
    Green,
    Red,
}

/// Write-only capability for the status LED driver.
pub trait StatusLed: Send {
    fn set(&mut self, color: LedColor);
}

/// Default LED for headless setups: does nothing.
#[derive(Debug, Default)]
pub struct NoopLed;

impl StatusLed for NoopLed {
    fn set(&mut self, _color: LedColor) {}
}

/// Turns the LED on for one tick's event and off again after
/// [`BLINK_OFF_COUNT`] quiet ticks, a visible ~80 ms blink at the 16 ms
/// tick rate.
pub struct LedBlinker {
    led: Box<dyn StatusLed>,
    lit: bool,
    quiet_ticks: u32,
}

impl LedBlinker {
    pub fn new(led: Box<dyn StatusLed>) -> Self {
        Self {
            led,
            lit: false,
            quiet_ticks: 0,
        }
    }

    /// Light the LED for the current event.
    pub fn flash(&mut self, color: LedColor) {
        self.led.set(color);
        self.lit = true;
        self.quiet_ticks = 0;
    }

    /// Advance one quiet tick; turns the LED off once the blink is over.
    pub fn tick(&mut self) {
        if !self.lit {
            return;
        }
        self.quiet_ticks += 1;
        if self.quiet_ticks >= BLINK_OFF_COUNT {
            self.led.set(LedColor::Off);
            self.lit = false;
        }
    }
}
