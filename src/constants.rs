//! Protocol Constants
//!
//! This module defines the constants used by the M-Bus framer, the
//! DLMS/COSEM decoder, and the bridge loop. M-Bus values follow the
//! EN 13757-2 long-frame layout; DLMS offsets follow the
//! general-glo-ciphering APDU layout of IEC 62056-5-3.

// ----------------------------------------------------------------------------
// M-Bus long frame (EN 13757-2)
//
// Pos  Meaning
// 0    Start (0x68)
// 1    Length from C field to checksum
// 2    Length (duplicated)
// 3    Start (0x68)
// 4..  Payload: C | A | CI | user-data
// 4+L  Checksum (sum of payload bytes mod 256)
// 5+L  Stop (0x16)
// ----------------------------------------------------------------------------

/// Start byte of a long frame (appears twice)
pub const MBUS_FRAME_START: u8 = 0x68;

/// Stop byte terminating a long frame
pub const MBUS_FRAME_STOP: u8 = 0x16;

/// Offset of the first start byte
pub const MBUS_START1_OFFSET: usize = 0;

/// Offset of the first length byte
pub const MBUS_LENGTH1_OFFSET: usize = 1;

/// Offset of the duplicated length byte
pub const MBUS_LENGTH2_OFFSET: usize = 2;

/// Offset of the second start byte
pub const MBUS_START2_OFFSET: usize = 3;

/// Bytes before the payload (start, length, length, start)
pub const MBUS_HEADER_LENGTH: usize = 4;

/// Bytes after the payload (checksum, stop)
pub const MBUS_FOOTER_LENGTH: usize = 2;

/// Smallest possible long frame: header + C|A|CI + checksum + stop
pub const MBUS_MIN_FRAME_LENGTH: usize = MBUS_HEADER_LENGTH + 3 + MBUS_FOOTER_LENGTH;

/// Upper bound on buffered rx bytes before the framer starts shedding
pub const MBUS_RX_BUFFER_LIMIT: usize = 4096;

// ----------------------------------------------------------------------------
// DLMS general-glo-ciphering APDU
//
// 0      Cipher tag (0xDB)
// 1      System title length (0x08)
// 2..10  System title
// 10     Length byte (0x82 => 16-bit big-endian length follows, header
//        grows by DLMS_HEADER_EXT_OFFSET)
// 11     Security control byte (0x21)
// 12..16 Frame counter
// 16..   Ciphertext
// ----------------------------------------------------------------------------

/// Offset of the cipher tag
pub const DLMS_CIPHER_OFFSET: usize = 0;

/// Only general-glo-ciphering is supported
pub const DLMS_CIPHER_GENERAL_GLO: u8 = 0xDB;

/// Offset of the system title length byte
pub const DLMS_SYST_OFFSET: usize = 1;

/// Only 8-byte system titles are supported
pub const DLMS_SYST_LENGTH: usize = 8;

/// Offset of the APDU length byte
pub const DLMS_LENGTH_OFFSET: usize = 10;

/// Length byte value announcing a 16-bit big-endian length
pub const DLMS_EXTENDED_LENGTH_TAG: u8 = 0x82;

/// Offset of the security control byte (before any header extension)
pub const DLMS_SECBYTE_OFFSET: usize = 11;

/// Only security suite 0x21 is supported
pub const DLMS_SECURITY_SUITE: u8 = 0x21;

/// Offset of the frame counter (before any header extension)
pub const DLMS_FRAMECOUNTER_OFFSET: usize = 12;

/// Frame counter length in bytes
pub const DLMS_FRAMECOUNTER_LENGTH: usize = 4;

/// Offset of the ciphertext (before any header extension)
pub const DLMS_PAYLOAD_OFFSET: usize = 16;

/// Header length with a one-byte length field
pub const DLMS_HEADER_LENGTH: usize = 16;

/// Extra header bytes when the length field is three bytes
pub const DLMS_HEADER_EXT_OFFSET: usize = 2;

/// The security byte and frame counter are counted inside the declared
/// length and must be subtracted to get the ciphertext length
pub const DLMS_LENGTH_CORRECTION: u16 = 5;

/// Smallest byte count that can hold a plausible APDU header
pub const DLMS_MIN_APDU_LENGTH: usize = 20;

/// Leading bytes of every M-Bus payload that carry meter transport
/// framing instead of APDU data
pub const DLMS_MBUS_SKIP_LENGTH: usize = 5;

/// First plaintext byte of a well-formed notification body
pub const DLMS_PLAINTEXT_TAG: u8 = 0x0F;

/// Plaintext byte 5 of a well-formed notification body
pub const DLMS_PLAINTEXT_DATETIME_TAG: u8 = 0x0C;

/// Offset of the first OBIS entry inside the plaintext
pub const OBIS_DECODER_START_OFFSET: usize = 20;

// ----------------------------------------------------------------------------
// Measurement plausibility limits
// ----------------------------------------------------------------------------

/// No residential connection sees more than 300 V phase-to-neutral
pub const PLAUSIBLE_VOLTAGE_LIMIT: f32 = 300.0;

/// No more than 32 A per phase for a normal house
pub const PLAUSIBLE_CURRENT_LIMIT: f32 = 32.0;

/// Three phases at the current limit and nominal voltage
pub const PLAUSIBLE_POWER_LIMIT: f32 = PLAUSIBLE_CURRENT_LIMIT * 230.0 * 3.0;

// ----------------------------------------------------------------------------
// Bridge loop
// ----------------------------------------------------------------------------

/// Cooperative tick interval of the bridge loop
pub const TICK_INTERVAL_MS: u64 = 16;

/// Quiet ticks before the status LED goes dark again (~80 ms blink)
pub const BLINK_OFF_COUNT: u32 = 5;

/// Factory-default Modbus slave address of the bridge
pub const DEFAULT_MODBUS_ADDRESS: u8 = 240;

/// sqrt(3), used for phase-to-phase voltages
pub const SQRT_3: f32 = 1.732_050_8;

/// The mains frequency is not measured by the meter; it is reported as
/// the nominal value of the region
pub const MAINS_FREQUENCY_HZ: f32 = 50.0;
