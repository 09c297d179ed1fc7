//! One decoded `d1`/`d2` pair.

use prost::Message;

use crate::{
    kotlin::{
        bitencoding::{decode_bytes, encode_bytes},
        protobuf::RawMessage,
        strings::{NameResolver, StringTableTypes},
    },
    Result,
};

/// The string table header followed by the class or package message.
///
/// The header is kept as the bytes it was read from, so encoding only ever changes the
/// message part.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    header: Vec<u8>,
    /// Decoded string table header
    pub types: StringTableTypes,
    /// The `d2` strings
    pub strings: Vec<String>,
    /// The class or package message
    pub message: RawMessage,
}

impl MetadataDocument {
    /// Decode `d1` against its `d2` strings.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `d1` carries data but `d2` is empty, and a
    /// decoding error for corrupt payloads.
    pub fn decode(d1: &[String], d2: &[String]) -> Result<Self> {
        let bytes = decode_bytes(d1)?;
        if !bytes.is_empty() && d2.is_empty() {
            return Err(malformed_error!("Metadata has d1 data but no d2 strings"));
        }

        if bytes.is_empty() {
            return Ok(MetadataDocument {
                header: Vec::new(),
                types: StringTableTypes::default(),
                strings: d2.to_vec(),
                message: RawMessage::new(),
            });
        }

        let mut rest = bytes.as_slice();
        let types = StringTableTypes::decode_length_delimited(&mut rest)?;
        let header = bytes[..bytes.len() - rest.len()].to_vec();
        let message = RawMessage::decode(rest)?;

        Ok(MetadataDocument {
            header,
            types,
            strings: d2.to_vec(),
            message,
        })
    }

    /// A resolver over this document's string table.
    #[must_use]
    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(&self.types, &self.strings)
    }

    /// The resolver together with the message it resolves strings for.
    pub fn split_mut(&mut self) -> (NameResolver<'_>, &mut RawMessage) {
        (
            NameResolver::new(&self.types, &self.strings),
            &mut self.message,
        )
    }

    /// Encode the document back to a `d1` array.
    #[must_use]
    pub fn encode(&self) -> Vec<String> {
        let mut bytes = self.header.clone();
        bytes.extend_from_slice(&self.message.encode());
        encode_bytes(&bytes)
    }
}

/// Assemble `d1` from a string table header and a message. Used to produce metadata for
/// hand-built classes.
#[must_use]
pub fn encode_document(types: &StringTableTypes, message: &RawMessage) -> Vec<String> {
    let mut bytes = types.encode_length_delimited_to_vec();
    bytes.extend_from_slice(&message.encode());
    encode_bytes(&bytes)
}
