//! # SunSpec Register Image
//!
//! The Modbus-visible face of the bridge: a fixed register map following
//! the SunSpec "Floating Point Meter Model 213" (3-phase AC meter, float
//! values) as polled by Fronius inverters.

pub mod model;

pub use model::SunSpecImage;
