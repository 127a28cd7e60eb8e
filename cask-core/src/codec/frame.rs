//! Tagged binary frames.
//!
//! Layout: `MAGIC`, one byte of tag length, the tag bytes, then the value
//! encoded with bincode's standard configuration.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use super::CodecError;

pub(crate) const MAGIC: u8 = 0xC5;
pub(crate) const MAX_TAG_LEN: usize = u8::MAX as usize;

pub(crate) fn encode<T>(tag: &str, value: &T) -> Result<Bytes, CodecError>
where
    T: Serialize,
{
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|err| CodecError::Serialize(Box::new(err)))?;

    let mut buf = Vec::with_capacity(2 + tag.len() + payload.len());
    buf.push(MAGIC);
    buf.push(tag.len() as u8);
    buf.extend_from_slice(tag.as_bytes());
    buf.extend_from_slice(&payload);
    Ok(Bytes::from(buf))
}

/// Splits a frame into its tag and payload, `None` if `data` is not a frame.
pub(crate) fn split(data: &[u8]) -> Option<(&str, &[u8])> {
    let (&magic, rest) = data.split_first()?;
    if magic != MAGIC {
        return None;
    }
    let (&len, rest) = rest.split_first()?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    let (tag, payload) = rest.split_at(len);
    std::str::from_utf8(tag).ok().map(|tag| (tag, payload))
}

pub(crate) fn decode<T>(expected: &str, data: &[u8]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    let (tag, payload) = split(data).ok_or_else(|| CodecError::TypeMismatch {
        expected: expected.to_owned(),
        found: "untagged bytes".to_owned(),
    })?;
    if tag != expected {
        return Err(CodecError::TypeMismatch {
            expected: expected.to_owned(),
            found: tag.to_owned(),
        });
    }

    let (value, read) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map_err(|err| CodecError::Deserialize(Box::new(err)))?;
    if read != payload.len() {
        return Err(CodecError::Deserialize(
            format!("{} trailing bytes after `{tag}` value", payload.len() - read).into(),
        ));
    }
    Ok(value)
}
