//! Explicit type registry owned by a [`Codec`](super::Codec).

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use super::CodecError;
use super::frame::MAX_TAG_LEN;
use crate::record::{Record, RecordDescriptor};

/// How values of a registered type are laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bytes are stored untouched (`Vec<u8>`).
    Raw,
    /// Integers are stored as ASCII decimal so remote counters can operate
    /// on them.
    Decimal,
    /// A tagged bincode frame carrying the registered name.
    Tagged,
}

#[derive(Debug, Clone)]
pub(crate) struct TypeEntry {
    pub(crate) name: Cow<'static, str>,
    pub(crate) encoding: Encoding,
}

/// Registered value types and record descriptors, keyed by [`TypeId`].
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<TypeId, TypeEntry>,
    names: HashMap<Cow<'static, str>, TypeId>,
    records: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

macro_rules! register_builtins {
    ($registry:ident, $encoding:expr, $($ty:ty => $name:literal),+ $(,)?) => {
        $( $registry.insert_unchecked::<$ty>(Cow::Borrowed($name), $encoding); )+
    };
}

impl TypeRegistry {
    /// Registry preloaded with primitives, strings and raw bytes.
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Self::default();
        register_builtins!(registry, Encoding::Decimal,
            i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", isize => "isize",
            u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", usize => "usize",
        );
        register_builtins!(registry, Encoding::Tagged,
            bool => "bool", char => "char", f32 => "f32", f64 => "f64",
            String => "string", () => "unit",
        );
        register_builtins!(registry, Encoding::Raw, Vec<u8> => "bytes");
        registry
    }

    fn insert_unchecked<T: 'static>(&mut self, name: Cow<'static, str>, encoding: Encoding) {
        self.names.insert(name.clone(), TypeId::of::<T>());
        self.types
            .insert(TypeId::of::<T>(), TypeEntry { name, encoding });
    }

    pub(crate) fn insert<T: 'static>(
        &mut self,
        name: Cow<'static, str>,
        encoding: Encoding,
    ) -> Result<(), CodecError> {
        if name.is_empty() || name.len() > MAX_TAG_LEN {
            return Err(CodecError::InvalidName(name.into_owned()));
        }
        let id = TypeId::of::<T>();
        match (self.names.get(&name), self.types.get(&id)) {
            (Some(bound), _) if *bound != id => Err(CodecError::DuplicateName(name.into_owned())),
            (_, Some(entry)) if entry.name != name => {
                Err(CodecError::DuplicateName(name.into_owned()))
            }
            (Some(_), Some(_)) => Ok(()),
            _ => {
                self.insert_unchecked::<T>(name, encoding);
                Ok(())
            }
        }
    }

    pub(crate) fn entry<T: 'static>(&self) -> Result<&TypeEntry, CodecError> {
        self.types
            .get(&TypeId::of::<T>())
            .ok_or(CodecError::Unregistered(type_name::<T>()))
    }

    pub(crate) fn contains_id(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Whether `T` has been registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    /// The name `T` was registered under.
    pub fn name_of<T: 'static>(&self) -> Option<&str> {
        self.types
            .get(&TypeId::of::<T>())
            .map(|entry| entry.name.as_ref())
    }

    /// Wire encoding used for `T`.
    pub fn encoding_of<T: 'static>(&self) -> Option<Encoding> {
        self.types.get(&TypeId::of::<T>()).map(|entry| entry.encoding)
    }

    /// Number of registered value types, builtins included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always `false` for registries created through a codec.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub(crate) fn insert_record<R: Record>(&mut self, descriptor: RecordDescriptor<R>) {
        self.records.insert(TypeId::of::<R>(), Box::new(descriptor));
    }

    pub(crate) fn record<R: Record>(&self) -> Option<&RecordDescriptor<R>> {
        self.records
            .get(&TypeId::of::<R>())
            .and_then(|descriptor| descriptor.downcast_ref::<RecordDescriptor<R>>())
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names.keys().map(AsRef::as_ref).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("types", &names)
            .field("records", &self.records.len())
            .finish()
    }
}
