//! # Measurement Sinks
//!
//! The decoder publishes each measurement into a caller-supplied set of
//! write-only channels, one per user-facing quantity. Every sink is
//! optional; an unwired quantity is simply dropped. The whole set is
//! injected at construction, so there is no process-wide mutable state.

/// Write-only channel for a numeric measurement.
pub trait MeasurementSink: Send {
    fn write(&self, value: f64);
}

/// Write-only channel for a textual value (timestamps, status strings).
pub trait TextSink: Send {
    fn write(&self, value: &str);
}

impl<F> MeasurementSink for F
where
    F: Fn(f64) + Send,
{
    fn write(&self, value: f64) {
        self(value)
    }
}

impl<F> TextSink for F
where
    F: Fn(&str) + Send,
{
    fn write(&self, value: &str) {
        self(value)
    }
}

/// The full capability set of meter outputs.
#[derive(Default)]
pub struct Sinks {
    pub voltage_l1: Option<Box<dyn MeasurementSink>>,
    pub voltage_l2: Option<Box<dyn MeasurementSink>>,
    pub voltage_l3: Option<Box<dyn MeasurementSink>>,
    pub current_l1: Option<Box<dyn MeasurementSink>>,
    pub current_l2: Option<Box<dyn MeasurementSink>>,
    pub current_l3: Option<Box<dyn MeasurementSink>>,
    pub active_power_plus: Option<Box<dyn MeasurementSink>>,
    pub active_power_minus: Option<Box<dyn MeasurementSink>>,
    pub active_energy_plus: Option<Box<dyn MeasurementSink>>,
    pub active_energy_minus: Option<Box<dyn MeasurementSink>>,
    pub reactive_energy_plus: Option<Box<dyn MeasurementSink>>,
    pub reactive_energy_minus: Option<Box<dyn MeasurementSink>>,
    pub timestamp: Option<Box<dyn TextSink>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Write to a sink when one is wired.
pub(crate) fn publish(sink: &Option<Box<dyn MeasurementSink>>, value: f32) {
    if let Some(sink) = sink {
        sink.write(f64::from(value));
    }
}

/// Write to a text sink when one is wired.
pub(crate) fn publish_text(sink: &Option<Box<dyn TextSink>>, value: &str) {
    if let Some(sink) = sink {
        sink.write(value);
    }
}
