//! # DLMS/COSEM Decoding
//!
//! The application layer of the meter link: reassembles ciphered DLMS
//! APDUs from M-Bus payloads, decrypts them with the meter's AES-128 key,
//! walks the OBIS-coded plaintext, and publishes typed measurements.

pub mod crypto;
pub mod decoder;
pub mod meter_data;
pub mod obis;
pub mod sinks;

pub use crypto::AesKey;
pub use decoder::{DecodeTick, DlmsDecoder};
pub use meter_data::MeterData;
pub use sinks::{MeasurementSink, Sinks, TextSink};
