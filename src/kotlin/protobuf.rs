//! A lossless view of protobuf messages whose schema is only partially known.
//!
//! The Kotlin metadata messages carry many fields the filter never looks at, plus extensions.
//! [`RawMessage`] keeps every field as it was read, in order, so that removing a handful of
//! declarations and encoding again leaves everything else untouched.

use prost::{
    bytes::Buf,
    encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType},
};

use crate::Result;

/// One field occurrence of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    /// The field number
    pub number: u32,
    /// The wire type the field was encoded with
    pub wire_type: WireType,
    /// Varint bytes, fixed-width bytes or the length-delimited content
    pub payload: Vec<u8>,
}

impl RawField {
    /// Interpret this occurrence as a varint.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the field is not a varint.
    pub fn as_varint(&self) -> Result<u64> {
        if self.wire_type != WireType::Varint {
            return Err(malformed_error!(
                "Field {} is {:?}, expected a varint",
                self.number,
                self.wire_type
            ));
        }
        let mut payload = self.payload.as_slice();
        Ok(decode_varint(&mut payload)?)
    }

    /// Interpret this occurrence as an embedded message.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the field is not length-delimited or its
    /// content does not decode.
    pub fn as_message(&self) -> Result<RawMessage> {
        if self.wire_type != WireType::LengthDelimited {
            return Err(malformed_error!(
                "Field {} is {:?}, expected a message",
                self.number,
                self.wire_type
            ));
        }
        RawMessage::decode(&self.payload)
    }
}

/// An ordered list of field occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    fields: Vec<RawField>,
}

impl RawMessage {
    /// Create an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a message from its wire form.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::Protobuf`] for truncated input,
    /// invalid keys and group fields.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let mut fields = Vec::new();

        while buf.has_remaining() {
            let (number, wire_type) = decode_key(&mut buf)?;
            let payload = match wire_type {
                WireType::Varint => {
                    let before = buf;
                    decode_varint(&mut buf)?;
                    before[..before.len() - buf.len()].to_vec()
                }
                WireType::SixtyFourBit => take(&mut buf, 8, number)?,
                WireType::ThirtyTwoBit => take(&mut buf, 4, number)?,
                WireType::LengthDelimited => {
                    let len = decode_varint(&mut buf)?;
                    let len = usize::try_from(len)
                        .map_err(|_| malformed_error!("Field {} is too long", number))?;
                    take(&mut buf, len, number)?
                }
                WireType::StartGroup | WireType::EndGroup => {
                    return Err(malformed_error!("Group field {} is not supported", number));
                }
            };
            fields.push(RawField {
                number,
                wire_type,
                payload,
            });
        }

        Ok(RawMessage { fields })
    }

    /// Encode the message to its wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.fields {
            encode_key(field.number, field.wire_type, &mut out);
            if field.wire_type == WireType::LengthDelimited {
                encode_varint(field.payload.len() as u64, &mut out);
            }
            out.extend_from_slice(&field.payload);
        }
        out
    }

    /// All field occurrences in wire order.
    #[must_use]
    pub fn fields(&self) -> &[RawField] {
        &self.fields
    }

    /// Returns `true` if any occurrence of `number` exists.
    #[must_use]
    pub fn has(&self, number: u32) -> bool {
        self.fields.iter().any(|field| field.number == number)
    }

    /// The last occurrence of a varint field, as protobuf merges scalars.
    ///
    /// # Errors
    /// Returns an error if the occurrence is not a valid varint.
    pub fn varint(&self, number: u32) -> Result<Option<u64>> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.number == number)
            .map(RawField::as_varint)
            .transpose()
    }

    /// The last occurrence of an `int32` field.
    ///
    /// # Errors
    /// Returns an error if the occurrence is not a valid varint.
    pub fn int32(&self, number: u32) -> Result<Option<i32>> {
        Ok(self.varint(number)?.map(|value| value as i32))
    }

    /// All values of a repeated `int32` field, packed or not.
    ///
    /// # Errors
    /// Returns an error if an occurrence holds truncated varints.
    pub fn int32s(&self, number: u32) -> Result<Vec<i32>> {
        let mut values = Vec::new();
        for field in self.fields.iter().filter(|field| field.number == number) {
            if field.wire_type == WireType::LengthDelimited {
                let mut packed = field.payload.as_slice();
                while packed.has_remaining() {
                    values.push(decode_varint(&mut packed)? as i32);
                }
            } else {
                values.push(field.as_varint()? as i32);
            }
        }
        Ok(values)
    }

    /// The last occurrence of an embedded message field.
    ///
    /// # Errors
    /// Returns an error if the occurrence does not decode.
    pub fn message(&self, number: u32) -> Result<Option<RawMessage>> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.number == number)
            .map(RawField::as_message)
            .transpose()
    }

    /// All occurrences of a repeated message field.
    ///
    /// # Errors
    /// Returns an error if any occurrence does not decode.
    pub fn messages(&self, number: u32) -> Result<Vec<RawMessage>> {
        self.fields
            .iter()
            .filter(|field| field.number == number)
            .map(RawField::as_message)
            .collect()
    }

    /// Remove the occurrences of a repeated message field whose position (counting only
    /// occurrences of `number`) is in `positions`. Returns how many were removed.
    pub fn remove_occurrences(&mut self, number: u32, positions: &[usize]) -> usize {
        if positions.is_empty() {
            return 0;
        }
        let before = self.fields.len();
        let mut position = 0;
        self.fields.retain(|field| {
            if field.number != number {
                return true;
            }
            let keep = !positions.contains(&position);
            position += 1;
            keep
        });
        before - self.fields.len()
    }

    /// Replace every occurrence of a repeated `int32` field with one packed occurrence,
    /// placed where the first one was. An empty list removes the field.
    pub fn set_int32s(&mut self, number: u32, values: &[i32]) {
        let first = self.fields.iter().position(|field| field.number == number);
        self.fields.retain(|field| field.number != number);
        if values.is_empty() {
            return;
        }

        let mut payload = Vec::new();
        for &value in values {
            encode_varint(i64::from(value) as u64, &mut payload);
        }
        let field = RawField {
            number,
            wire_type: WireType::LengthDelimited,
            payload,
        };
        let at = first.unwrap_or(self.fields.len()).min(self.fields.len());
        self.fields.insert(at, field);
    }

    /// Append a varint field.
    pub fn push_varint(&mut self, number: u32, value: u64) {
        let mut payload = Vec::new();
        encode_varint(value, &mut payload);
        self.fields.push(RawField {
            number,
            wire_type: WireType::Varint,
            payload,
        });
    }

    /// Append an `int32` field.
    pub fn push_int32(&mut self, number: u32, value: i32) {
        self.push_varint(number, i64::from(value) as u64);
    }

    /// Append a length-delimited field.
    pub fn push_bytes(&mut self, number: u32, payload: Vec<u8>) {
        self.fields.push(RawField {
            number,
            wire_type: WireType::LengthDelimited,
            payload,
        });
    }

    /// Append an embedded message field.
    pub fn push_message(&mut self, number: u32, message: &RawMessage) {
        self.push_bytes(number, message.encode());
    }

    /// Builder form of [`RawMessage::push_int32`].
    #[must_use]
    pub fn with_int32(mut self, number: u32, value: i32) -> Self {
        self.push_int32(number, value);
        self
    }

    /// Builder form of [`RawMessage::push_message`].
    #[must_use]
    pub fn with_message(mut self, number: u32, message: &RawMessage) -> Self {
        self.push_message(number, message);
        self
    }
}

fn take(buf: &mut &[u8], len: usize, number: u32) -> Result<Vec<u8>> {
    if buf.len() < len {
        return Err(malformed_error!(
            "Field {} needs {} bytes, {} left",
            number,
            len,
            buf.len()
        ));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_unknown_fields() {
        let inner = RawMessage::new().with_int32(2, 7);
        let mut message = RawMessage::new().with_int32(1, 6).with_message(9, &inner);
        message.push_bytes(100, vec![0x08, 0x01]);
        message.fields.push(RawField {
            number: 12,
            wire_type: WireType::ThirtyTwoBit,
            payload: vec![1, 2, 3, 4],
        });

        let bytes = message.encode();
        let decoded = RawMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_scalar_access() {
        let message = RawMessage::new().with_int32(1, 3).with_int32(1, -2);
        assert_eq!(message.int32(1).unwrap(), Some(-2));
        assert_eq!(message.int32(2).unwrap(), None);
        assert_eq!(message.int32s(1).unwrap(), vec![3, -2]);
    }

    #[test]
    fn test_packed_ints() {
        let mut message = RawMessage::new().with_int32(1, 6).with_int32(7, 10);
        message.push_int32(7, 11);
        message.push_int32(3, 1);
        assert_eq!(message.int32s(7).unwrap(), vec![10, 11]);

        message.set_int32s(7, &[11, 300]);
        assert_eq!(message.fields()[1].number, 7);
        assert_eq!(message.fields()[1].wire_type, WireType::LengthDelimited);
        let decoded = RawMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded.int32s(7).unwrap(), vec![11, 300]);

        message.set_int32s(7, &[]);
        assert!(!message.has(7));
    }

    #[test]
    fn test_remove_occurrences() {
        let function = |name| RawMessage::new().with_int32(2, name);
        let mut message = RawMessage::new()
            .with_message(9, &function(0))
            .with_int32(1, 6)
            .with_message(9, &function(1))
            .with_message(9, &function(2));

        assert_eq!(message.remove_occurrences(9, &[0, 2]), 2);
        let functions = message.messages(9).unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].int32(2).unwrap(), Some(1));
        assert_eq!(message.int32(1).unwrap(), Some(6));
    }

    #[test]
    fn test_truncated_input() {
        assert!(RawMessage::decode(&[0x0a, 0x05, 0x01]).is_err());
        assert!(RawMessage::decode(&[0x08]).is_err());
        // group start
        assert!(RawMessage::decode(&[0x0b]).is_err());
    }
}
