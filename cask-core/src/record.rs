//! Field-level introspection of structured records.
//!
//! A record type describes its fields once through [`Record::describe`].
//! The resulting [`RecordDescriptor`] is built when the record is registered
//! with a [`Codec`] and lets hash-backed stores address fields by name:
//! project a record onto `(name, bytes)` pairs, decode a stored field in
//! place, or overwrite a field with a value of the exact declared type.
//!
//! ```
//! use cask_core::{Codec, Fields, Record};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Session {
//!     user: String,
//!     hits: i64,
//!     #[serde(skip)]
//!     scratch: String,
//! }
//!
//! impl Record for Session {
//!     fn describe(fields: &mut Fields<Self>) {
//!         fields
//!             .field("User", |s| &s.user, |s| &mut s.user)
//!             .field("Hits", |s| &s.hits, |s| &mut s.hits)
//!             .private("scratch");
//!     }
//! }
//!
//! let codec = Codec::builder().register_record::<Session>("session").build().unwrap();
//! let descriptor = codec.record::<Session>().unwrap();
//!
//! let mut session = Session::default();
//! descriptor.set_field(&mut session, "Hits", 3i64).unwrap();
//! assert_eq!(session.hits, 3);
//! assert!(descriptor.set_field(&mut session, "Hits", 3i32).is_err());
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::codec::{Codec, CodecError};

/// Errors reported by record field access.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The type has no registered descriptor.
    #[error("record: type `{0}` is not a registered record")]
    Unregistered(&'static str),

    /// The record declares no field with this name.
    #[error("record: no field named `{0}`")]
    NoSuchField(String),

    /// The field exists but is private to the record.
    #[error("record: field `{0}` is not exported")]
    Unexported(String),

    /// The supplied value's type differs from the field's declared type.
    #[error("record: field `{field}` holds `{expected}`, got `{found}`")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared field type.
        expected: &'static str,
        /// Type of the rejected value.
        found: &'static str,
    },
}

/// A struct whose fields can be addressed by name.
pub trait Record: Send + Sync + Sized + 'static {
    /// Declares the record's fields in order.
    fn describe(fields: &mut Fields<Self>);
}

/// Type-erased decoding into a field's storage.
trait SlotDecoder: Send + Sync {
    fn value_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    fn decode(&self, codec: &Codec, data: &[u8], slot: &mut dyn Any) -> Result<(), CodecError>;

    /// Decodes into a detached value, leaving every field untouched.
    fn stage(&self, codec: &Codec, data: &[u8]) -> Result<Box<dyn Any + Send>, CodecError>;

    /// Moves a value produced by `stage` into the field's storage.
    fn commit(&self, slot: &mut dyn Any, staged: Box<dyn Any + Send>);
}

trait ErasedField<R>: SlotDecoder {
    fn encode(&self, codec: &Codec, record: &R) -> Result<Bytes, CodecError>;

    fn slot<'a>(&self, record: &'a mut R) -> &'a mut dyn Any;
}

struct Accessor<R, V> {
    get: fn(&R) -> &V,
    get_mut: fn(&mut R) -> &mut V,
}

impl<R, V> SlotDecoder for Accessor<R, V>
where
    R: 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn value_type(&self) -> TypeId {
        TypeId::of::<V>()
    }

    fn type_name(&self) -> &'static str {
        type_name::<V>()
    }

    fn decode(&self, codec: &Codec, data: &[u8], slot: &mut dyn Any) -> Result<(), CodecError> {
        let dest = slot
            .downcast_mut::<V>()
            .ok_or(CodecError::Unregistered(type_name::<V>()))?;
        codec.deserialize(data, dest)
    }

    fn stage(&self, codec: &Codec, data: &[u8]) -> Result<Box<dyn Any + Send>, CodecError> {
        Ok(Box::new(codec.decode::<V>(data)?))
    }

    fn commit(&self, slot: &mut dyn Any, staged: Box<dyn Any + Send>) {
        if let (Some(dest), Ok(value)) = (slot.downcast_mut::<V>(), staged.downcast::<V>()) {
            *dest = *value;
        }
    }
}

impl<R, V> ErasedField<R> for Accessor<R, V>
where
    R: 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, codec: &Codec, record: &R) -> Result<Bytes, CodecError> {
        codec.serialize((self.get)(record))
    }

    fn slot<'a>(&self, record: &'a mut R) -> &'a mut dyn Any {
        (self.get_mut)(record)
    }
}

struct FieldDescriptor<R> {
    name: &'static str,
    // `None` for private fields
    access: Option<Box<dyn ErasedField<R>>>,
}

/// Collects field declarations for [`Record::describe`].
pub struct Fields<R> {
    fields: Vec<FieldDescriptor<R>>,
}

impl<R: Record> Fields<R> {
    /// Declares an exported field with its accessors.
    pub fn field<V>(
        &mut self,
        name: &'static str,
        get: fn(&R) -> &V,
        get_mut: fn(&mut R) -> &mut V,
    ) -> &mut Self
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.fields.push(FieldDescriptor {
            name,
            access: Some(Box::new(Accessor { get, get_mut })),
        });
        self
    }

    /// Declares a private field: known to exist, never surfaced.
    pub fn private(&mut self, name: &'static str) -> &mut Self {
        self.fields.push(FieldDescriptor { name, access: None });
        self
    }
}

/// Per-type field table built once at registration.
pub struct RecordDescriptor<R> {
    fields: Vec<FieldDescriptor<R>>,
    index: HashMap<&'static str, usize>,
}

impl<R: Record> RecordDescriptor<R> {
    pub(crate) fn build(record: &str) -> Result<Self, CodecError> {
        let mut fields = Fields { fields: Vec::new() };
        R::describe(&mut fields);
        let fields = fields.fields;
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if index.insert(field.name, position).is_some() {
                return Err(CodecError::DuplicateField {
                    record: record.to_owned(),
                    field: field.name,
                });
            }
        }
        Ok(Self { fields, index })
    }

    pub(crate) fn exported_types(
        &self,
    ) -> impl Iterator<Item = (&'static str, TypeId, &'static str)> + '_ {
        self.fields.iter().filter_map(|field| {
            field
                .access
                .as_ref()
                .map(|access| (field.name, access.value_type(), access.type_name()))
        })
    }

    fn exported(&self, name: &str) -> Result<&dyn ErasedField<R>, RecordError> {
        let field = self
            .index
            .get(name)
            .map(|position| &self.fields[*position])
            .ok_or_else(|| RecordError::NoSuchField(name.to_owned()))?;
        field
            .access
            .as_deref()
            .ok_or_else(|| RecordError::Unexported(name.to_owned()))
    }

    /// Whether the record declares a field named `name`, exported or not.
    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Exported field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|field| field.access.is_some())
            .map(|field| field.name)
    }

    /// Live handle to an exported field's storage.
    pub fn field_mut<'a>(
        &'a self,
        record: &'a mut R,
        name: &str,
    ) -> Result<FieldSlot<'a>, RecordError> {
        let field = self.exported(name)?;
        Ok(FieldSlot {
            name: self.fields[self.index[name]].name,
            value: field.slot(record),
            decoder: field,
        })
    }

    /// Overwrites an exported field in place.
    ///
    /// `V` must be exactly the declared field type; no widening or
    /// conversion is attempted.
    pub fn set_field<V: Any>(&self, record: &mut R, name: &str, value: V) -> Result<(), RecordError> {
        let field = self.exported(name)?;
        let expected = field.type_name();
        match field.slot(record).downcast_mut::<V>() {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RecordError::TypeMismatch {
                field: name.to_owned(),
                expected,
                found: type_name::<V>(),
            }),
        }
    }

    /// Decodes named fields into `record`, all or nothing.
    ///
    /// Every mapped field is decoded before any of them is written, so a
    /// decode failure leaves `record` unchanged. Names without an exported
    /// counterpart are not decoded and are returned to the caller.
    pub fn decode_fields<N, D>(
        &self,
        codec: &Codec,
        record: &mut R,
        fields: impl IntoIterator<Item = (N, D)>,
    ) -> Result<Vec<N>, CodecError>
    where
        N: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let mut staged = Vec::new();
        let mut unmapped = Vec::new();
        for (name, data) in fields {
            match self.exported(name.as_ref()) {
                Ok(field) => staged.push((field, field.stage(codec, data.as_ref())?)),
                Err(_) => unmapped.push(name),
            }
        }
        for (field, value) in staged {
            field.commit(field.slot(record), value);
        }
        Ok(unmapped)
    }

    /// Encodes every exported field, in declaration order.
    ///
    /// Private fields are skipped. Fails on the first field that cannot be
    /// serialized.
    pub fn to_named_serialized(
        &self,
        codec: &Codec,
        record: &R,
    ) -> Result<Vec<(&'static str, Bytes)>, CodecError> {
        self.fields
            .iter()
            .filter_map(|field| field.access.as_ref().map(|access| (field.name, access)))
            .map(|(name, access)| access.encode(codec, record).map(|bytes| (name, bytes)))
            .collect()
    }
}

impl<R> fmt::Debug for RecordDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDescriptor")
            .field("record", &type_name::<R>())
            .field(
                "fields",
                &self.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Mutable handle to one field of a record.
pub struct FieldSlot<'a> {
    name: &'static str,
    value: &'a mut dyn Any,
    decoder: &'a dyn SlotDecoder,
}

impl FieldSlot<'_> {
    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared type of the field.
    pub fn type_name(&self) -> &'static str {
        self.decoder.type_name()
    }

    /// Decodes stored bytes directly into the field.
    pub fn decode(&mut self, codec: &Codec, data: &[u8]) -> Result<(), CodecError> {
        self.decoder.decode(codec, data, &mut *self.value)
    }

    /// Typed access to the field's storage.
    pub fn downcast_mut<V: Any>(&mut self) -> Option<&mut V> {
        self.value.downcast_mut::<V>()
    }
}

impl fmt::Debug for FieldSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSlot")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .finish()
    }
}
