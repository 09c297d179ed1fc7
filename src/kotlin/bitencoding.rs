//! The string encoding of the `d1` array.
//!
//! The protobuf payload of `@kotlin.Metadata` is stored as an array of strings because
//! annotation values cannot hold byte arrays. Two encodings exist:
//!
//! - **UTF-8 mode**: the first string starts with the marker `\u{0}` and every following
//!   character carries one byte (`0..=255`). Strings are split so that each stays below the
//!   65535 byte limit of a modified UTF-8 constant.
//! - **8-to-7 mode** (legacy, optional marker `\u{FFFF}`): the bytes are packed into 7-bit
//!   groups, shifted by `0x7F` modulo 128 and stored one group per character.
//!
//! Decoding accepts both; encoding always produces UTF-8 mode.

use crate::Result;

/// First character of a UTF-8 mode `d1` array.
pub const UTF8_MODE_MARKER: char = '\u{0}';

/// Optional first character of an 8-to-7 mode `d1` array.
pub const LEGACY_MODE_MARKER: char = '\u{FFFF}';

/// Limit of the modified UTF-8 length of one string constant.
const MAX_UTF8_INFO_LENGTH: usize = 65535;

/// Decode a `d1` array into the protobuf bytes it carries.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a UTF-8 mode character does not fit in a byte.
pub fn decode_bytes(data: &[String]) -> Result<Vec<u8>> {
    let first = data.first().and_then(|string| string.chars().next());
    match first {
        Some(UTF8_MODE_MARKER) => {
            let mut bytes = Vec::with_capacity(data.iter().map(String::len).sum());
            for (index, string) in data.iter().enumerate() {
                let mut chars = string.chars();
                if index == 0 {
                    chars.next();
                }
                for c in chars {
                    let Ok(byte) = u8::try_from(u32::from(c)) else {
                        return Err(malformed_error!(
                            "Character U+{:04X} in UTF-8 mode metadata",
                            u32::from(c)
                        ));
                    };
                    bytes.push(byte);
                }
            }
            Ok(bytes)
        }
        Some(LEGACY_MODE_MARKER) => {
            let mut units = combine(data);
            units.remove(0);
            Ok(decode_7to8(&units))
        }
        _ => Ok(decode_7to8(&combine(data))),
    }
}

fn combine(data: &[String]) -> Vec<u8> {
    data.iter()
        .flat_map(|string| string.encode_utf16())
        .map(|unit| unit as u8)
        .collect()
}

fn decode_7to8(data: &[u8]) -> Vec<u8> {
    let shifted: Vec<u8> = data.iter().map(|b| b.wrapping_add(0x7F) & 0x7F).collect();
    let result_len = 7 * shifted.len() / 8;
    let mut result = Vec::with_capacity(result_len);
    let mut index = 0;
    let mut bit = 0;
    for _ in 0..result_len {
        let first = u32::from(shifted[index]) >> bit;
        index += 1;
        let second = (u32::from(shifted[index]) & ((1 << (bit + 1)) - 1)) << (7 - bit);
        result.push((first + second) as u8);
        if bit == 6 {
            index += 1;
            bit = 0;
        } else {
            bit += 1;
        }
    }
    result
}

/// Encode protobuf bytes as a UTF-8 mode `d1` array.
#[must_use]
pub fn encode_bytes(bytes: &[u8]) -> Vec<String> {
    let mut result = Vec::new();
    let mut buffer = String::new();
    buffer.push(UTF8_MODE_MARKER);
    // the marker is encoded as C0 80
    let mut encoded_len = 2;

    for &byte in bytes {
        buffer.push(char::from(byte));
        encoded_len += if (1..=127).contains(&byte) { 1 } else { 2 };
        if encoded_len >= MAX_UTF8_INFO_LENGTH - 1 {
            result.push(std::mem::take(&mut buffer));
            encoded_len = 0;
        }
    }

    if !buffer.is_empty() {
        result.push(buffer);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::constantpool::encode_modified_utf8;

    #[test]
    fn test_utf8_mode_roundtrip() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let encoded = encode_bytes(&bytes);
        assert_eq!(encoded.len(), 1);
        assert!(encoded[0].starts_with(UTF8_MODE_MARKER));
        assert_eq!(decode_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_utf8_mode_splits_long_payloads() {
        let bytes = vec![0x80u8; 70_000];
        let encoded = encode_bytes(&bytes);
        assert!(encoded.len() > 1);
        for string in &encoded {
            assert!(encode_modified_utf8(string).len() < MAX_UTF8_INFO_LENGTH);
        }
        assert_eq!(decode_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_utf8_mode_rejects_wide_chars() {
        let data = vec![format!("{}\u{100}", UTF8_MODE_MARKER)];
        assert!(decode_bytes(&data).is_err());
    }

    #[test]
    fn test_legacy_mode() {
        // 8 groups of 7 bits carry 7 bytes; with every group zero after the shift the
        // payload is all zero bytes.
        let zero_group = char::from(0x01u8);
        let data = vec![std::iter::repeat(zero_group).take(8).collect::<String>()];
        assert_eq!(decode_bytes(&data).unwrap(), vec![0u8; 7]);

        let mut marked = String::from(LEGACY_MODE_MARKER);
        marked.extend(std::iter::repeat(zero_group).take(8));
        assert_eq!(decode_bytes(&[marked]).unwrap(), vec![0u8; 7]);
    }

    #[test]
    fn test_empty() {
        assert!(decode_bytes(&[]).unwrap().is_empty());
        assert_eq!(encode_bytes(&[]), vec![String::from(UTF8_MODE_MARKER)]);
    }
}
