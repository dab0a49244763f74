//! # Hex Encoding/Decoding Utilities
//!
//! Thin wrappers around the `hex` crate used for key parsing, frame
//! logging, and test data. Decoding is lenient about whitespace so keys
//! copied from meter-operator portals ("AB CD ...") parse as-is.

use crate::error::BridgeError;

/// Encode bytes to a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string to bytes.
///
/// Accepts upper- and lowercase characters; whitespace is stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, BridgeError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return Err(BridgeError::InvalidHexString);
    }
    hex::decode(&cleaned).map_err(|_| BridgeError::InvalidHexString)
}

/// Format bytes as "68 03 03 68" for log output.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let data = vec![0x68, 0x03, 0x03, 0x68, 0x53, 0x01, 0xBB];
        assert_eq!(decode_hex(&encode_hex(&data)).unwrap(), data);
    }

    #[test]
    fn test_decode_with_whitespace() {
        assert_eq!(
            decode_hex("68 03 03 68").unwrap(),
            vec![0x68, 0x03, 0x03, 0x68]
        );
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_hex("").is_err());
        assert!(decode_hex("6").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex_compact(&[0x68, 0x03]), "68 03");
    }
}
