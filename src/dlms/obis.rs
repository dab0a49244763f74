//! # OBIS Code Tables
//!
//! OBIS codes (`A-B:C.D.E*F`, six bytes on the wire) classify every value
//! inside a DLMS notification. The bridge only needs the electricity
//! quantities of a residential three-phase meter plus a few abstract
//! codes, so classification is a match over the medium byte (`A`) and the
//! `C.D` pair.

/// Byte positions inside a six-byte OBIS code.
pub const OBIS_A: usize = 0;
pub const OBIS_C: usize = 2;
pub const OBIS_D: usize = 3;

/// OBIS medium (value group A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    Abstract,
    Electricity,
    Unsupported(u8),
}

impl From<u8> for Medium {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => Medium::Abstract,
            0x01 => Medium::Electricity,
            other => Medium::Unsupported(other),
        }
    }
}

/// The meter quantity a decoded OBIS entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    VoltageL1,
    VoltageL2,
    VoltageL3,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    ActivePowerPlus,
    ActivePowerMinus,
    ActiveEnergyPlus,
    ActiveEnergyMinus,
    ReactiveEnergyPlus,
    ReactiveEnergyMinus,
    Timestamp,
    SerialNumber,
    DeviceName,
    Unknown,
}

/// Classify an OBIS code by medium and `C.D` pair.
///
/// Unknown combinations map to [`CodeType::Unknown`]; the caller logs and
/// keeps walking.
pub fn classify(obis: &[u8]) -> CodeType {
    let (c, d) = (obis[OBIS_C], obis[OBIS_D]);
    match Medium::from(obis[OBIS_A]) {
        Medium::Electricity => match (c, d) {
            (32, 7) => CodeType::VoltageL1,
            (52, 7) => CodeType::VoltageL2,
            (72, 7) => CodeType::VoltageL3,
            (31, 7) => CodeType::CurrentL1,
            (51, 7) => CodeType::CurrentL2,
            (71, 7) => CodeType::CurrentL3,
            (1, 7) => CodeType::ActivePowerPlus,
            (2, 7) => CodeType::ActivePowerMinus,
            (1, 8) => CodeType::ActiveEnergyPlus,
            (2, 8) => CodeType::ActiveEnergyMinus,
            (3, 8) => CodeType::ReactiveEnergyPlus,
            (4, 8) => CodeType::ReactiveEnergyMinus,
            _ => CodeType::Unknown,
        },
        Medium::Abstract => match (c, d) {
            (1, 0) => CodeType::Timestamp,
            (0, 0) => CodeType::SerialNumber,
            (42, 0) => CodeType::DeviceName,
            _ => CodeType::Unknown,
        },
        Medium::Unsupported(_) => CodeType::Unknown,
    }
}

/// DLMS data type tags the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    DoubleLongUnsigned,
    OctetString,
    LongUnsigned,
    Unsupported(u8),
}

/// Tag byte of an octet string, also the OBIS entry header type.
pub const OCTET_STRING_TAG: u8 = 0x09;

impl From<u8> for DataType {
    fn from(byte: u8) -> Self {
        match byte {
            0x06 => DataType::DoubleLongUnsigned,
            0x09 => DataType::OctetString,
            0x12 => DataType::LongUnsigned,
            other => DataType::Unsupported(other),
        }
    }
}

/// Scaler byte values announcing decimal digits for LongUnsigned values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    SingleDigit,
    DoubleDigit,
    None,
}

impl From<u8> for Accuracy {
    fn from(byte: u8) -> Self {
        match byte {
            0xFF => Accuracy::SingleDigit,
            0xFE => Accuracy::DoubleDigit,
            _ => Accuracy::None,
        }
    }
}

impl Accuracy {
    /// Apply the announced scaling to a raw register value.
    pub fn scale(self, raw: u16) -> f32 {
        match self {
            Accuracy::SingleDigit => f32::from(raw) / 10.0,
            Accuracy::DoubleDigit => f32::from(raw) / 100.0,
            Accuracy::None => f32::from(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_electricity_codes() {
        // 1-0:32.7.0*255 is voltage L1
        assert_eq!(
            classify(&[0x01, 0x00, 0x20, 0x07, 0x00, 0xFF]),
            CodeType::VoltageL1
        );
        assert_eq!(
            classify(&[0x01, 0x00, 0x47, 0x07, 0x00, 0xFF]),
            CodeType::CurrentL3
        );
        assert_eq!(
            classify(&[0x01, 0x00, 0x01, 0x08, 0x00, 0xFF]),
            CodeType::ActiveEnergyPlus
        );
        assert_eq!(
            classify(&[0x01, 0x00, 0x04, 0x08, 0x00, 0xFF]),
            CodeType::ReactiveEnergyMinus
        );
    }

    #[test]
    fn test_classify_abstract_codes() {
        assert_eq!(
            classify(&[0x00, 0x00, 0x01, 0x00, 0x00, 0xFF]),
            CodeType::Timestamp
        );
        assert_eq!(
            classify(&[0x00, 0x00, 0x2A, 0x00, 0x00, 0xFF]),
            CodeType::DeviceName
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            classify(&[0x01, 0x00, 0x63, 0x07, 0x00, 0xFF]),
            CodeType::Unknown
        );
        assert_eq!(
            classify(&[0x08, 0x00, 0x01, 0x00, 0x00, 0xFF]),
            CodeType::Unknown
        );
    }

    #[test]
    fn test_accuracy_scaling() {
        assert_eq!(Accuracy::from(0xFF).scale(2301), 230.1);
        assert_eq!(Accuracy::from(0xFE).scale(512), 5.12);
        assert_eq!(Accuracy::from(0x00).scale(50), 50.0);
    }
}
