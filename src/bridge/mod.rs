//! # Bridge Orchestration
//!
//! Ties the three protocol engines together on one cooperative loop:
//! every ~16 ms tick pumps the M-Bus UART through the DLMS decoder, fills
//! the SunSpec image from each decoded snapshot, and serves Modbus reads
//! from the second UART, all without blocking, so a scheduler can
//! interleave other work between ticks.

pub mod led;

use chrono::NaiveDateTime;

use crate::constants::{MAINS_FREQUENCY_HZ, SQRT_3};
use crate::dlms::{AesKey, DlmsDecoder, MeterData, Sinks, TextSink};
use crate::io::{ByteSink, ByteSource};
use crate::modbus::{ExceptionCode, ModbusServer, RequestRead, ResponseRead};
use crate::sunspec::SunSpecImage;

pub use led::{LedBlinker, LedColor, NoopLed, StatusLed};

/// Clock capability (SNTP or similar, external). `None` before the first
/// synchronization.
pub trait TimeSource: Send {
    fn now(&self) -> Option<NaiveDateTime>;
}

/// Tracks the wall-clock window during which the house fed the grid.
///
/// Without a synchronized clock the text stays `"--"`.
struct FlowWindow {
    start: Option<NaiveDateTime>,
    text: String,
}

impl FlowWindow {
    fn new() -> Self {
        Self {
            start: None,
            text: "--".to_string(),
        }
    }

    fn update(&mut self, exporting: bool, now: Option<NaiveDateTime>) -> bool {
        if !exporting {
            self.start = None;
            return false;
        }
        let Some(now) = now else {
            return false;
        };
        let start = *self.start.get_or_insert(now);
        let text = format!("{} - {}", start.format("%H:%M"), now.format("%H:%M"));
        if text == self.text {
            false
        } else {
            self.text = text;
            true
        }
    }
}

/// The DLMS-to-SunSpec bridge.
pub struct Bridge {
    decoder: DlmsDecoder,
    modbus: ModbusServer,
    image: SunSpecImage,
    led: LedBlinker,
    time_source: Option<Box<dyn TimeSource>>,
    flow_window: FlowWindow,
    flow_window_sink: Option<Box<dyn TextSink>>,
}

impl Bridge {
    /// Wire up the bridge. `modbus_address` is served on the RTU link and
    /// mirrored into the SunSpec common block.
    pub fn new(key: AesKey, modbus_address: u8, sinks: Sinks) -> Self {
        Self {
            decoder: DlmsDecoder::new(key, sinks),
            modbus: ModbusServer::new(modbus_address),
            image: SunSpecImage::new(modbus_address),
            led: LedBlinker::new(Box::new(NoopLed)),
            time_source: None,
            flow_window: FlowWindow::new(),
            flow_window_sink: None,
        }
    }

    /// Replace the no-op LED with a real driver.
    pub fn with_status_led(mut self, led: Box<dyn StatusLed>) -> Self {
        self.led = LedBlinker::new(led);
        self
    }

    /// Attach a clock for the energy-flow window text.
    pub fn with_time_source(mut self, source: Box<dyn TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }

    /// Attach a sink for the energy-flow window text.
    pub fn with_flow_window_sink(mut self, sink: Box<dyn TextSink>) -> Self {
        self.flow_window_sink = Some(sink);
        self
    }

    /// Disable the net-power-based current sign convention.
    pub fn with_current_inversion(mut self, enabled: bool) -> Self {
        self.decoder = self.decoder.with_current_inversion(enabled);
        self
    }

    /// One cooperative tick: meter side first, then the inverter side.
    pub fn tick(
        &mut self,
        mbus_source: &mut dyn ByteSource,
        modbus_source: &mut dyn ByteSource,
        modbus_sink: &mut dyn ByteSink,
    ) {
        let decoded = self.decoder.tick(mbus_source);
        for snapshot in &decoded.snapshots {
            self.apply_snapshot(snapshot);
        }
        if !decoded.snapshots.is_empty() {
            self.led.flash(LedColor::Green);
        } else if decoded.errors > 0 {
            self.led.flash(LedColor::Red);
        }

        let image = &self.image;
        self.modbus
            .tick(modbus_source, modbus_sink, |function_code, request| {
                Self::handle_read(image, function_code, request)
            });

        self.led.tick();
    }

    /// Current energy-flow window text (`"--"` without clock or export).
    pub fn energy_flow_window(&self) -> &str {
        &self.flow_window.text
    }

    /// Answer one Modbus read from the register image.
    fn handle_read(
        image: &SunSpecImage,
        function_code: u8,
        request: &RequestRead,
    ) -> ResponseRead {
        if function_code != 0x03 {
            log::warn!("modbus: received wrong function code {function_code}");
            return ResponseRead::exception(ExceptionCode::IllegalFunction);
        }
        log::debug!(
            "modbus: read request, address = {}, count = {}",
            request.start_address,
            request.address_count
        );
        if !image.is_valid_range(u32::from(request.start_address), request.address_count) {
            return ResponseRead::exception(ExceptionCode::IllegalAddress);
        }
        match image.get_raw(u32::from(request.start_address), request.address_count) {
            Some(data) => ResponseRead::data(data),
            None => ResponseRead::exception(ExceptionCode::DeviceFailure),
        }
    }

    /// Fill the SunSpec image from one meter snapshot.
    ///
    /// The meter reports totals only, so per-phase power is derived from
    /// voltage, current, and the displacement factor, and the energy
    /// counters are split evenly across the phases.
    fn apply_snapshot(&mut self, data: &MeterData) {
        let power_factor = data.power_factor();
        let average_voltage = data.average_voltage();

        let apparent_l1 = data.voltage_l1 * data.current_l1;
        let apparent_l2 = data.voltage_l2 * data.current_l2;
        let apparent_l3 = data.voltage_l3 * data.current_l3;
        let apparent_total = apparent_l1 + apparent_l2 + apparent_l3;

        let active_l1 = apparent_l1 * power_factor;
        let active_l2 = apparent_l2 * power_factor;
        let active_l3 = apparent_l3 * power_factor;

        // Not the trigonometric identity; the downstream inverter expects
        // this split.
        let reactive_l1 = apparent_l1 * (1.0 - power_factor);
        let reactive_l2 = apparent_l2 * (1.0 - power_factor);
        let reactive_l3 = apparent_l3 * (1.0 - power_factor);

        let current_total = data.current_l1 + data.current_l2 + data.current_l3;
        self.image
            .set_ac_current(current_total, data.current_l1, data.current_l2, data.current_l3);
        self.image.set_voltage_to_neutral(
            average_voltage,
            data.voltage_l1,
            data.voltage_l2,
            data.voltage_l3,
        );
        self.image.set_voltage_phase_to_phase(
            MeterData::phase_to_phase_voltage(average_voltage),
            data.voltage_l1 * SQRT_3,
            data.voltage_l2 * SQRT_3,
            data.voltage_l3 * SQRT_3,
        );
        self.image.set_frequency(MAINS_FREQUENCY_HZ);
        self.image
            .set_power(data.active_power_net(), active_l1, active_l2, active_l3);
        self.image
            .set_apparent_power(apparent_total, apparent_l1, apparent_l2, apparent_l3);
        self.image.set_reactive_power(
            reactive_l1 + reactive_l2 + reactive_l3,
            reactive_l1,
            reactive_l2,
            reactive_l3,
        );
        self.image
            .set_power_factor(power_factor, power_factor, power_factor, power_factor);

        let wh_exported = data.active_energy_minus;
        let wh_imported = data.active_energy_plus;
        let vah_exported = data.reactive_energy_minus;
        let vah_imported = data.reactive_energy_plus;
        let third = |total: f32| total / 3.0;
        self.image.set_total_wh_exported(
            wh_exported,
            third(wh_exported),
            third(wh_exported),
            third(wh_exported),
        );
        self.image.set_total_wh_imported(
            wh_imported,
            third(wh_imported),
            third(wh_imported),
            third(wh_imported),
        );
        self.image.set_total_vah_exported(
            vah_exported,
            third(vah_exported),
            third(vah_exported),
            third(vah_exported),
        );
        self.image.set_total_vah_imported(
            vah_imported,
            third(vah_imported),
            third(vah_imported),
            third(vah_imported),
        );

        let exporting = data.active_power_net() < 0.0;
        let now = self.time_source.as_ref().and_then(|source| source.now());
        if self.flow_window.update(exporting, now) {
            if let Some(sink) = &self.flow_window_sink {
                sink.write(&self.flow_window.text);
            }
        }
    }

    /// Read access for tests and diagnostics.
    pub fn image(&self) -> &SunSpecImage {
        &self.image
    }
}
