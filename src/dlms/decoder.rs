//! # DLMS Notification Decoder
//!
//! Consumes M-Bus payloads, reassembles the ciphered APDU they carry,
//! decrypts it, and walks the OBIS-coded plaintext into a [`MeterData`]
//! snapshot.
//!
//! Meters routinely split one DLMS frame across several M-Bus frames
//! (the Kaifa MA309M sends two), so a length shortfall is not an error:
//! the assembly waits for more input. Everything else (unsupported
//! header fields, implausible lengths, garbage plaintext) clears the
//! assembly and starts over with the next frame.

use crate::constants::{
    DLMS_CIPHER_GENERAL_GLO, DLMS_CIPHER_OFFSET, DLMS_EXTENDED_LENGTH_TAG,
    DLMS_FRAMECOUNTER_LENGTH, DLMS_FRAMECOUNTER_OFFSET, DLMS_HEADER_EXT_OFFSET,
    DLMS_HEADER_LENGTH, DLMS_LENGTH_CORRECTION, DLMS_LENGTH_OFFSET, DLMS_MBUS_SKIP_LENGTH,
    DLMS_MIN_APDU_LENGTH, DLMS_PAYLOAD_OFFSET, DLMS_PLAINTEXT_DATETIME_TAG, DLMS_PLAINTEXT_TAG,
    DLMS_SECBYTE_OFFSET, DLMS_SECURITY_SUITE, DLMS_SYST_LENGTH, DLMS_SYST_OFFSET,
    OBIS_DECODER_START_OFFSET, PLAUSIBLE_CURRENT_LIMIT, PLAUSIBLE_POWER_LIMIT,
    PLAUSIBLE_VOLTAGE_LIMIT,
};
use crate::io::ByteSource;
use crate::mbus::MbusFramer;
use crate::util::LogThrottle;

use super::crypto::{apply_keystream, AesKey};
use super::meter_data::MeterData;
use super::obis::{self, Accuracy, CodeType, DataType, Medium, OCTET_STRING_TAG};
use super::sinks::{publish, publish_text, Sinks};

/// Result of one decoder tick.
#[derive(Debug, Default)]
pub struct DecodeTick {
    /// Snapshots decoded this tick, in arrival order.
    pub snapshots: Vec<MeterData>,
    /// Fatal parse errors this tick (each one reset the assembly).
    pub errors: u32,
}

enum ParseStatus {
    Decoded(MeterData),
    NeedMoreData,
    Failed(&'static str),
}

/// Streaming DLMS decoder over an M-Bus byte source.
pub struct DlmsDecoder {
    framer: MbusFramer,
    assembly: Vec<u8>,
    key: AesKey,
    sinks: Sinks,
    data: MeterData,
    invert_current_direction: bool,
    error_throttle: LogThrottle,
}

impl DlmsDecoder {
    pub fn new(key: AesKey, sinks: Sinks) -> Self {
        Self {
            framer: MbusFramer::new(),
            assembly: Vec::new(),
            key,
            sinks,
            data: MeterData::default(),
            invert_current_direction: true,
            error_throttle: LogThrottle::new(1000, 5),
        }
    }

    /// Enable or disable the net-power-based current sign convention.
    pub fn with_current_inversion(mut self, enabled: bool) -> Self {
        self.invert_current_direction = enabled;
        self
    }

    /// Drain the M-Bus byte source and decode whatever completes.
    pub fn tick(&mut self, source: &mut dyn ByteSource) -> DecodeTick {
        while source.available() {
            match source.read_byte() {
                Some(byte) => self.framer.push(byte),
                None => break,
            }
        }

        let mut tick = DecodeTick::default();
        while let Some(payload) = self.framer.pull() {
            log::debug!("dlms: mbus payload of {} bytes", payload.len());
            if payload.len() > DLMS_MBUS_SKIP_LENGTH {
                // The first five payload bytes are meter transport framing.
                self.assembly
                    .extend_from_slice(&payload[DLMS_MBUS_SKIP_LENGTH..]);
            }
            match self.try_parse() {
                ParseStatus::Decoded(snapshot) => {
                    log::debug!("dlms: decoded notification, {snapshot:?}");
                    tick.snapshots.push(snapshot);
                }
                ParseStatus::NeedMoreData => {}
                ParseStatus::Failed(reason) => {
                    if self.error_throttle.allow() {
                        log::error!("dlms: {reason}, dropping assembled frame");
                    }
                    self.assembly.clear();
                    tick.errors += 1;
                }
            }
        }
        tick
    }

    /// Validate the assembled APDU header, decrypt, and walk the payload.
    fn try_parse(&mut self) -> ParseStatus {
        use ParseStatus::{Decoded, Failed, NeedMoreData};

        if self.assembly.len() < DLMS_MIN_APDU_LENGTH {
            return Failed("payload too short");
        }
        if self.assembly[DLMS_CIPHER_OFFSET] != DLMS_CIPHER_GENERAL_GLO {
            return Failed("unsupported cipher");
        }
        if self.assembly[DLMS_SYST_OFFSET] as usize != DLMS_SYST_LENGTH {
            return Failed("unsupported system title length");
        }

        let length_byte = self.assembly[DLMS_LENGTH_OFFSET];
        let (declared_length, header_offset) = if length_byte == DLMS_EXTENDED_LENGTH_TAG {
            let length = u16::from_be_bytes([
                self.assembly[DLMS_LENGTH_OFFSET + 1],
                self.assembly[DLMS_LENGTH_OFFSET + 2],
            ]);
            (length, DLMS_HEADER_EXT_OFFSET)
        } else {
            (u16::from(length_byte), 0)
        };
        // Part of the header is counted inside the declared length.
        let Some(message_length) = declared_length.checked_sub(DLMS_LENGTH_CORRECTION) else {
            return Failed("implausible declared length");
        };
        let message_length = message_length as usize;

        let assembled = self.assembly.len() - DLMS_HEADER_LENGTH - header_offset;
        if assembled != message_length {
            log::debug!(
                "dlms: frame of {message_length} bytes has only {assembled} yet, waiting"
            );
            return NeedMoreData;
        }

        if self.assembly[header_offset + DLMS_SECBYTE_OFFSET] != DLMS_SECURITY_SUITE {
            return Failed("unsupported security control byte");
        }

        // 12-byte IV: system title (the byte after its length) + frame counter
        let mut iv = [0u8; 12];
        let title_start = DLMS_SYST_OFFSET + 1;
        iv[..DLMS_SYST_LENGTH]
            .copy_from_slice(&self.assembly[title_start..title_start + DLMS_SYST_LENGTH]);
        let counter_start = header_offset + DLMS_FRAMECOUNTER_OFFSET;
        iv[DLMS_SYST_LENGTH..]
            .copy_from_slice(&self.assembly[counter_start..counter_start + DLMS_FRAMECOUNTER_LENGTH]);

        let payload_start = header_offset + DLMS_PAYLOAD_OFFSET;
        let mut plaintext = self.assembly[payload_start..payload_start + message_length].to_vec();
        apply_keystream(&self.key, &iv, &mut plaintext);

        if plaintext.first() != Some(&DLMS_PLAINTEXT_TAG)
            || plaintext.get(5) != Some(&DLMS_PLAINTEXT_DATETIME_TAG)
        {
            return Failed("packet decrypted but data is invalid");
        }

        if let Err(reason) = self.walk_obis(&plaintext) {
            return Failed(reason);
        }

        let mut snapshot = self.data.clone();
        if self.invert_current_direction && snapshot.active_power_net() < 0.0 {
            // Feeding the grid: flip the current signs to show direction.
            snapshot.current_l1 = -snapshot.current_l1;
            snapshot.current_l2 = -snapshot.current_l2;
            snapshot.current_l3 = -snapshot.current_l3;
            publish(&self.sinks.current_l1, snapshot.current_l1);
            publish(&self.sinks.current_l2, snapshot.current_l2);
            publish(&self.sinks.current_l3, snapshot.current_l3);
        }

        self.assembly.clear();
        Decoded(snapshot)
    }

    /// Walk the OBIS entries of a decrypted notification.
    fn walk_obis(&mut self, plaintext: &[u8]) -> Result<(), &'static str> {
        let message_length = plaintext.len();
        let mut pos = OBIS_DECODER_START_OFFSET;

        // Minimum entry: code header (8 bytes) + data type byte.
        while pos + 9 <= message_length {
            if plaintext[pos] != OCTET_STRING_TAG {
                return Err("unsupported obis header type");
            }
            if plaintext[pos + 1] != 0x06 {
                return Err("unsupported obis header length");
            }
            let obis = &plaintext[pos + 2..pos + 8];
            if matches!(Medium::from(obis[0]), Medium::Unsupported(_)) {
                return Err("unsupported obis medium");
            }
            let code_type = obis::classify(obis);
            if code_type == CodeType::Unknown {
                log::warn!("dlms: unsupported obis code {obis:02x?}");
            }
            pos += 8;

            let data_type = DataType::from(plaintext[pos]);
            pos += 1;

            let data_length = match data_type {
                DataType::DoubleLongUnsigned => {
                    if pos + 4 > message_length {
                        return Err("truncated integer value");
                    }
                    let raw = u32::from_be_bytes([
                        plaintext[pos],
                        plaintext[pos + 1],
                        plaintext[pos + 2],
                        plaintext[pos + 3],
                    ]);
                    self.store_counter(code_type, raw as f32);
                    4
                }
                DataType::LongUnsigned => {
                    if pos + 2 > message_length {
                        return Err("truncated integer value");
                    }
                    let raw = u16::from_be_bytes([plaintext[pos], plaintext[pos + 1]]);
                    // The scaler byte sits five positions ahead, inside the
                    // trailer that follows the value.
                    let accuracy = Accuracy::from(plaintext.get(pos + 5).copied().unwrap_or(0));
                    self.store_register(code_type, accuracy.scale(raw));
                    2
                }
                DataType::OctetString => {
                    if pos >= message_length {
                        return Err("truncated octet string");
                    }
                    let length = plaintext[pos] as usize;
                    pos += 1;
                    if pos + length > message_length {
                        return Err("truncated octet string");
                    }
                    if code_type == CodeType::Timestamp && length >= 8 {
                        let stamp = decode_timestamp(&plaintext[pos..pos + 8]);
                        publish_text(&self.sinks.timestamp, &stamp);
                        self.data.timestamp = Some(stamp);
                    }
                    length
                }
                DataType::Unsupported(_) => return Err("unsupported obis data type"),
            };

            pos += data_length;
            pos += 2; // break after the value
            if plaintext.get(pos) == Some(&DLMS_PLAINTEXT_TAG) {
                pos += 6; // scaler/unit trailer
            }
            if pos > message_length {
                break;
            }
        }
        Ok(())
    }

    /// Store a 32-bit quantity (power in W, energy in Wh/varh).
    fn store_counter(&mut self, code_type: CodeType, value: f32) {
        match code_type {
            CodeType::ActivePowerPlus => {
                let value = clamp_plausible(value, PLAUSIBLE_POWER_LIMIT, "active power +");
                self.data.active_power_plus = value;
                publish(&self.sinks.active_power_plus, value);
            }
            CodeType::ActivePowerMinus => {
                let value = clamp_plausible(value, PLAUSIBLE_POWER_LIMIT, "active power -");
                self.data.active_power_minus = value;
                publish(&self.sinks.active_power_minus, value);
            }
            CodeType::ActiveEnergyPlus => {
                self.data.active_energy_plus = value;
                publish(&self.sinks.active_energy_plus, value);
            }
            CodeType::ActiveEnergyMinus => {
                self.data.active_energy_minus = value;
                publish(&self.sinks.active_energy_minus, value);
            }
            CodeType::ReactiveEnergyPlus => {
                self.data.reactive_energy_plus = value;
                publish(&self.sinks.reactive_energy_plus, value);
            }
            CodeType::ReactiveEnergyMinus => {
                self.data.reactive_energy_minus = value;
                publish(&self.sinks.reactive_energy_minus, value);
            }
            _ => {}
        }
    }

    /// Store a 16-bit quantity (voltage in V, current in A).
    fn store_register(&mut self, code_type: CodeType, value: f32) {
        match code_type {
            CodeType::VoltageL1 => {
                let value = clamp_plausible(value, PLAUSIBLE_VOLTAGE_LIMIT, "voltage L1");
                self.data.voltage_l1 = value;
                publish(&self.sinks.voltage_l1, value);
            }
            CodeType::VoltageL2 => {
                let value = clamp_plausible(value, PLAUSIBLE_VOLTAGE_LIMIT, "voltage L2");
                self.data.voltage_l2 = value;
                publish(&self.sinks.voltage_l2, value);
            }
            CodeType::VoltageL3 => {
                let value = clamp_plausible(value, PLAUSIBLE_VOLTAGE_LIMIT, "voltage L3");
                self.data.voltage_l3 = value;
                publish(&self.sinks.voltage_l3, value);
            }
            CodeType::CurrentL1 => {
                let value = clamp_plausible(value, PLAUSIBLE_CURRENT_LIMIT, "current L1");
                self.data.current_l1 = value;
                publish(&self.sinks.current_l1, value);
            }
            CodeType::CurrentL2 => {
                let value = clamp_plausible(value, PLAUSIBLE_CURRENT_LIMIT, "current L2");
                self.data.current_l2 = value;
                publish(&self.sinks.current_l2, value);
            }
            CodeType::CurrentL3 => {
                let value = clamp_plausible(value, PLAUSIBLE_CURRENT_LIMIT, "current L3");
                self.data.current_l3 = value;
                publish(&self.sinks.current_l3, value);
            }
            _ => {}
        }
    }
}

/// Force implausible readings to zero rather than poisoning the image.
fn clamp_plausible(value: f32, limit: f32, what: &str) -> f32 {
    if value > limit {
        log::error!("dlms: {what} value {value} is greater than limit {limit}, forcing 0.0");
        0.0
    } else {
        value
    }
}

/// Render the first 8 bytes of a COSEM date-time as ISO-8601.
fn decode_timestamp(bytes: &[u8]) -> String {
    let year = u16::from_be_bytes([bytes[0], bytes[1]]);
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z",
        month = bytes[2],
        day = bytes[3],
        hour = bytes[5],
        minute = bytes[6],
        second = bytes[7],
    )
}
