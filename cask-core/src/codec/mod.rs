//! Value serialization with an explicit, build-once type registry.
//!
//! Every type crossing the codec boundary must be registered before the
//! codec is built. Primitives, strings and raw bytes come preregistered;
//! application types are added through [`CodecBuilder`]. Once built the
//! codec is immutable and is meant to be shared behind an `Arc`.
//!
//! ```
//! use cask_core::Codec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Point { x: i32, y: i32 }
//!
//! let codec = Codec::builder().register::<Point>("point").build().unwrap();
//! let bytes = codec.serialize(&Point { x: 1, y: 2 }).unwrap();
//!
//! let mut decoded = Point { x: 0, y: 0 };
//! codec.deserialize(&bytes, &mut decoded).unwrap();
//! assert_eq!(decoded, Point { x: 1, y: 2 });
//! ```

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, trace};

use crate::record::{Record, RecordDescriptor, RecordError};

mod frame;
mod registry;

pub use registry::{Encoding, TypeRegistry};

/// Errors produced while registering, encoding or decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The type was never registered with this codec.
    #[error("codec: type `{0}` is not registered")]
    Unregistered(&'static str),

    /// Stored bytes belong to a different registered type.
    #[error("codec: expected a `{expected}` value, found `{found}`")]
    TypeMismatch {
        /// Registered name of the destination type.
        expected: String,
        /// What the stored bytes turned out to be.
        found: String,
    },

    /// A name or type was registered twice with different counterparts.
    #[error("codec: `{0}` is already registered for another type")]
    DuplicateName(String),

    /// A record declares two fields with the same name.
    #[error("codec: record `{record}` declares field `{field}` twice")]
    DuplicateField {
        /// Registered name of the record.
        record: String,
        /// The repeated field name.
        field: &'static str,
    },

    /// Registration names must be non-empty and at most 255 bytes.
    #[error("codec: invalid registration name `{0}`")]
    InvalidName(String),

    /// A record declares an exported field whose type is not registered.
    #[error("codec: field `{field}` of record `{record}` has unregistered type `{type_name}`")]
    UnregisteredField {
        /// Registered name of the record.
        record: String,
        /// Field name.
        field: &'static str,
        /// Rust type name of the field.
        type_name: &'static str,
    },

    /// Encoding failed.
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    /// Decoding failed.
    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// Value codec owning its type registry.
#[derive(Debug)]
pub struct Codec {
    registry: TypeRegistry,
}

impl Default for Codec {
    /// Codec with only the builtin types registered.
    fn default() -> Self {
        Self {
            registry: TypeRegistry::with_builtins(),
        }
    }
}

impl Codec {
    /// Starts a builder preloaded with the builtin types.
    pub fn builder() -> CodecBuilder {
        CodecBuilder::default()
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Encodes `value` according to its registered encoding.
    pub fn serialize<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + 'static,
    {
        let entry = self.registry.entry::<T>()?;
        match entry.encoding {
            Encoding::Raw => (value as &dyn Any)
                .downcast_ref::<Vec<u8>>()
                .map(|raw| Bytes::copy_from_slice(raw))
                .ok_or(CodecError::Unregistered(type_name::<T>())),
            Encoding::Decimal => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|err| CodecError::Serialize(Box::new(err))),
            Encoding::Tagged => frame::encode(&entry.name, value),
        }
    }

    /// Decodes `data` into `dest`, overwriting it on success only.
    pub fn deserialize<T>(&self, data: &[u8], dest: &mut T) -> Result<(), CodecError>
    where
        T: DeserializeOwned + 'static,
    {
        *dest = self.decode(data)?;
        Ok(())
    }

    /// Decodes `data` into a fresh value.
    pub fn decode<T>(&self, data: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned + 'static,
    {
        let entry = self.registry.entry::<T>()?;
        match entry.encoding {
            Encoding::Raw => (Box::new(data.to_vec()) as Box<dyn Any>)
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| CodecError::Unregistered(type_name::<T>())),
            Encoding::Decimal => {
                if let Some((tag, _)) = frame::split(data) {
                    return Err(CodecError::TypeMismatch {
                        expected: entry.name.to_string(),
                        found: tag.to_owned(),
                    });
                }
                serde_json::from_slice(data).map_err(|err| CodecError::Deserialize(Box::new(err)))
            }
            Encoding::Tagged => frame::decode(&entry.name, data),
        }
    }

    /// Field descriptor table of a registered record type.
    pub fn record<R: Record>(&self) -> Result<&RecordDescriptor<R>, RecordError> {
        self.registry
            .record::<R>()
            .ok_or(RecordError::Unregistered(type_name::<R>()))
    }
}

struct FieldCheck {
    record: Cow<'static, str>,
    field: &'static str,
    value_type: TypeId,
    type_name: &'static str,
}

/// Builder collecting registrations for a [`Codec`].
///
/// Registration errors are deferred to [`CodecBuilder::build`] so the builder
/// can be chained.
pub struct CodecBuilder {
    registry: TypeRegistry,
    field_checks: Vec<FieldCheck>,
    error: Option<CodecError>,
}

impl Default for CodecBuilder {
    fn default() -> Self {
        Self {
            registry: TypeRegistry::with_builtins(),
            field_checks: Vec::new(),
            error: None,
        }
    }
}

impl CodecBuilder {
    /// Registers `T` under `name` as a tagged value.
    ///
    /// Only `T` itself is recorded. Custom types nested inside `T` are
    /// encoded as part of its payload and need no registration of their
    /// own; field types are checked only for records registered with
    /// [`CodecBuilder::register_record`].
    pub fn register<T>(mut self, name: impl Into<Cow<'static, str>>) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        let name = name.into();
        match self.registry.insert::<T>(name.clone(), Encoding::Tagged) {
            Ok(()) => trace!(%name, type_name = type_name::<T>(), "Registered cache type"),
            Err(err) => {
                debug!(%name, %err, "Cache type registration rejected");
                self.error = Some(err);
            }
        }
        self
    }

    /// Registers record `R` under `name`.
    ///
    /// The record is registered as a tagged value and its field descriptor
    /// table is built here, once. Exported field types are checked against
    /// the registry when the codec is built, so registration order between a
    /// record and its field types does not matter.
    pub fn register_record<R>(self, name: impl Into<Cow<'static, str>>) -> Self
    where
        R: Record + Serialize + DeserializeOwned,
    {
        let name = name.into();
        let mut builder = self.register::<R>(name.clone());
        if builder.error.is_some() {
            return builder;
        }

        let descriptor = match RecordDescriptor::<R>::build(&name) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                builder.error = Some(err);
                return builder;
            }
        };
        builder
            .field_checks
            .extend(descriptor.exported_types().map(|(field, value_type, type_name)| {
                FieldCheck {
                    record: name.clone(),
                    field,
                    value_type,
                    type_name,
                }
            }));
        builder.registry.insert_record(descriptor);
        builder
    }

    /// Finishes registration.
    pub fn build(self) -> Result<Codec, CodecError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if let Some(check) = self
            .field_checks
            .iter()
            .find(|check| !self.registry.contains_id(check.value_type))
        {
            return Err(CodecError::UnregisteredField {
                record: check.record.to_string(),
                field: check.field,
                type_name: check.type_name,
            });
        }
        Ok(Codec {
            registry: self.registry,
        })
    }
}
