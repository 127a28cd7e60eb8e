#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod counter;
mod error;
mod expiration;
pub mod record;
mod store;

/// Serialized value bytes as stored by a backend.
pub type Raw = bytes::Bytes;

pub use codec::{Codec, CodecBuilder, CodecError};
pub use error::{CacheError, CacheResult};
pub use expiration::Expiration;
pub use record::{FieldSlot, Fields, Record, RecordDescriptor, RecordError};
pub use store::{Backend, CacheStore, Encode, Slot};
