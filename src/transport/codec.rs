use crate::transport::error::{Result, TransportError};
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Cursor;

/// Header length: kind (1) + format version (1)
pub const HEADER_LEN: usize = 2;

/// Current payload format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Kinds of transportable payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    /// An argument or result value
    Object = 0x01,
    /// A reference to a function
    Callable = 0x02,
}

impl PayloadKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Object),
            0x02 => Some(Self::Callable),
            _ => None,
        }
    }
}

/// Encode a payload with given kind
pub fn encode_payload(kind: PayloadKind, payload: &impl Serialize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN);

    buf.push(kind as u8);
    buf.push(FORMAT_VERSION);

    let mut ser = Serializer::new(&mut buf);
    payload
        .serialize(&mut ser)
        .map_err(|e| TransportError::EncodeError(e.to_string()))?;

    Ok(buf)
}

/// Decode payload kind from raw bytes
pub fn decode_header(data: &[u8]) -> Result<PayloadKind> {
    if data.len() < HEADER_LEN {
        return Err(TransportError::DecodeError("Payload too short".to_string()));
    }

    let kind = PayloadKind::from_u8(data[0])
        .ok_or_else(|| TransportError::DecodeError(format!("Unknown payload kind: {}", data[0])))?;

    if data[1] != FORMAT_VERSION {
        return Err(TransportError::DecodeError(format!(
            "Unsupported format version: {}",
            data[1]
        )));
    }

    Ok(kind)
}

/// Decode a payload, checking that it carries the expected kind
pub fn decode_payload<T: DeserializeOwned>(expected: PayloadKind, data: &[u8]) -> Result<T> {
    let found = decode_header(data)?;
    if found != expected {
        return Err(TransportError::KindMismatch { expected, found });
    }

    let mut de = Deserializer::new(Cursor::new(&data[HEADER_LEN..]));
    T::deserialize(&mut de).map_err(|e| TransportError::DecodeError(e.to_string()))
}
