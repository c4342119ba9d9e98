use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::CodecError;
use crate::key::Prefix;
use crate::repr::Representation;
use crate::safety::check_safety;

/// Integer widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl IntType {
    pub fn is_signed(self) -> bool {
        matches!(self, IntType::I8 | IntType::I16 | IntType::I32 | IntType::I64)
    }

    /// Whether the textual encoding carries this width as a string.
    pub fn is_wide(self) -> bool {
        matches!(self, IntType::U64 | IntType::I64)
    }

    /// Inclusive bounds as i128, wide enough for every width.
    pub fn bounds(self) -> (i128, i128) {
        match self {
            IntType::U8 => (0, u8::MAX as i128),
            IntType::U16 => (0, u16::MAX as i128),
            IntType::U32 => (0, u32::MAX as i128),
            IntType::U64 => (0, u64::MAX as i128),
            IntType::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntType::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntType::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntType::I64 => (i64::MIN as i128, i64::MAX as i128),
        }
    }

    pub fn contains(self, n: i128) -> bool {
        let (lo, hi) = self.bounds();
        (lo..=hi).contains(&n)
    }
}

/// Floating-point widths. Never deterministic across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatType {
    F32,
    F64,
}

/// The closed set of kinds a descriptor can describe.
#[derive(Debug, Clone)]
pub enum Kind {
    Bool,
    Int(IntType),
    Float(FloatType),
    /// UTF-8 text.
    Unicode,
    ByteString,
    /// The designated temporal type, see [`crate::Timestamp`].
    Time,
    Sequence(Arc<TypeDescriptor>),
    Array {
        elem: Arc<TypeDescriptor>,
        len: usize,
    },
    /// Struct with fields ordered by declaration.
    Record(Vec<FieldDescriptor>),
    /// One level of optional indirection.
    Pointer(Arc<TypeDescriptor>),
    /// Polymorphic value over registered concrete variants.
    Interface(InterfaceDescriptor),
    /// A type only encodable through its representation.
    Opaque,
}

impl Kind {
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int(_) => "int",
            Kind::Float(_) => "float",
            Kind::Unicode => "unicode",
            Kind::ByteString => "bytes",
            Kind::Time => "time",
            Kind::Sequence(_) => "sequence",
            Kind::Array { .. } => "array",
            Kind::Record(_) => "record",
            Kind::Pointer(_) => "pointer",
            Kind::Interface(_) => "interface",
            Kind::Opaque => "opaque",
        }
    }
}

/// Registered concrete variants of a polymorphic type, in registration order.
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    variants: IndexMap<String, (Prefix, Arc<TypeDescriptor>)>,
}

impl InterfaceDescriptor {
    /// Builds the variant table. Names and disambiguation prefixes must be unique,
    /// and a variant may not itself be a pointer or an interface.
    pub fn new(
        variants: impl IntoIterator<Item = Arc<TypeDescriptor>>,
    ) -> Result<Self, CodecError> {
        let mut table = IndexMap::new();
        let mut prefixes = HashSet::new();
        for variant in variants {
            if matches!(variant.kind(), Kind::Pointer(_) | Kind::Interface(_)) {
                return Err(CodecError::contract(format!(
                    "concrete variant {} must not be a {}",
                    variant.name(),
                    variant.kind().label()
                )));
            }
            let prefix = Prefix::from_name(variant.name());
            if !prefixes.insert(prefix) {
                return Err(CodecError::contract(format!(
                    "disambiguation prefix {prefix} of {} collides with another variant",
                    variant.name()
                )));
            }
            let name = variant.name().to_string();
            if table.insert(name.clone(), (prefix, variant)).is_some() {
                return Err(CodecError::contract(format!(
                    "concrete variant {name} registered twice"
                )));
            }
        }
        Ok(InterfaceDescriptor { variants: table })
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variant(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.variants.get(name).map(|(_, ty)| ty)
    }

    pub fn prefix_of(&self, name: &str) -> Option<Prefix> {
        self.variants.get(name).map(|(prefix, _)| *prefix)
    }

    pub fn variant_by_prefix(&self, prefix: Prefix) -> Option<&Arc<TypeDescriptor>> {
        self.variants
            .values()
            .find(|(p, _)| *p == prefix)
            .map(|(_, ty)| ty)
    }

    pub fn variants(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.variants.values().map(|(_, ty)| ty)
    }
}

/// One field of a record.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    index: u32,
    name: String,
    ty: Arc<TypeDescriptor>,
    is_unsafe: bool,
    omit_empty: bool,
}

impl FieldDescriptor {
    pub fn new(index: u32, name: impl Into<String>, ty: Arc<TypeDescriptor>) -> Self {
        FieldDescriptor {
            index,
            name: name.into(),
            ty,
            is_unsafe: false,
            omit_empty: false,
        }
    }

    /// Allows otherwise-forbidden floating-point types in this field.
    pub fn with_unsafe(mut self, is_unsafe: bool) -> Self {
        self.is_unsafe = is_unsafe;
        self
    }

    pub fn with_omit_empty(mut self, omit_empty: bool) -> Self {
        self.omit_empty = omit_empty;
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Arc<TypeDescriptor> {
        &self.ty
    }

    pub fn is_unsafe(&self) -> bool {
        self.is_unsafe
    }

    pub fn omit_empty(&self) -> bool {
        self.omit_empty
    }
}

/// Immutable metadata for one static type.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: Kind,
    pointer_preferred: bool,
    repr: Option<Representation>,
}

impl TypeDescriptor {
    /// Records, interfaces and opaque types go through their validating
    /// constructors instead.
    pub(crate) fn new(name: impl Into<String>, kind: Kind) -> Self {
        TypeDescriptor {
            name: name.into(),
            kind,
            pointer_preferred: false,
            repr: None,
        }
    }

    pub fn pointer(inner: Arc<TypeDescriptor>) -> Self {
        TypeDescriptor::new(format!("*{}", inner.name()), Kind::Pointer(inner))
    }

    pub fn sequence(elem: Arc<TypeDescriptor>) -> Self {
        TypeDescriptor::new(format!("[]{}", elem.name()), Kind::Sequence(elem))
    }

    pub fn array(elem: Arc<TypeDescriptor>, len: usize) -> Self {
        TypeDescriptor::new(format!("[{len}]{}", elem.name()), Kind::Array { elem, len })
    }

    /// Builds a record descriptor, running the safety gate on every field.
    pub fn record(
        name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, CodecError> {
        let name = name.into();
        let mut seen = HashSet::new();
        for field in &fields {
            if field.index() == 0 {
                return Err(CodecError::contract(format!(
                    "{name}.{}: field indexes start at 1",
                    field.name()
                )));
            }
            if !seen.insert(field.index()) {
                return Err(CodecError::contract(format!(
                    "{name}.{}: duplicate field index {}",
                    field.name(),
                    field.index()
                )));
            }
            check_safety(field)?;
        }
        Ok(TypeDescriptor::new(name, Kind::Record(fields)))
    }

    pub fn interface(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = Arc<TypeDescriptor>>,
    ) -> Result<Self, CodecError> {
        Ok(TypeDescriptor::new(
            name,
            Kind::Interface(InterfaceDescriptor::new(variants)?),
        ))
    }

    /// Builds an opaque descriptor; the representation is mandatory.
    pub fn opaque(name: impl Into<String>, repr: Representation) -> Self {
        TypeDescriptor::new(name, Kind::Opaque).with_representation(repr)
    }

    pub fn with_pointer_preferred(mut self, pointer_preferred: bool) -> Self {
        self.pointer_preferred = pointer_preferred;
        self
    }

    pub fn with_representation(mut self, repr: Representation) -> Self {
        self.repr = Some(repr);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn pointer_preferred(&self) -> bool {
        self.pointer_preferred
    }

    pub fn representation(&self) -> Option<&Representation> {
        self.repr.as_ref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        match &self.kind {
            Kind::Record(fields) => fields,
            _ => &[],
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, Kind::Pointer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind, Kind::Float(_))
    }

    /// The pointed-to type. Fails for non-pointer descriptors.
    pub fn pointee(&self) -> Result<&Arc<TypeDescriptor>, CodecError> {
        match &self.kind {
            Kind::Pointer(inner) => Ok(inner),
            other => Err(CodecError::contract(format!(
                "expected pointer, got {} ({})",
                self.name,
                other.label()
            ))),
        }
    }

    /// Strips every pointer level, returning the innermost descriptor and the
    /// number of levels removed.
    pub fn deref_all(&self) -> (&TypeDescriptor, usize) {
        let mut ty = self;
        let mut depth = 0;
        while let Kind::Pointer(inner) = &ty.kind {
            ty = inner;
            depth += 1;
        }
        (ty, depth)
    }

    pub fn interface_variants(&self) -> Result<&InterfaceDescriptor, CodecError> {
        match &self.kind {
            Kind::Interface(iface) => Ok(iface),
            other => Err(CodecError::contract(format!(
                "expected interface, got {} ({})",
                self.name,
                other.label()
            ))),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pointer_preferred", &self.pointer_preferred)
            .field("repr", &self.repr.as_ref().map(|r| r.descriptor().name()))
            .finish()
    }
}

/// Descriptors for the built-in primitive kinds.
pub mod primitives {
    use super::*;

    pub fn bool() -> TypeDescriptor {
        TypeDescriptor::new("bool", Kind::Bool)
    }

    pub fn int(width: IntType) -> TypeDescriptor {
        let name = match width {
            IntType::U8 => "u8",
            IntType::U16 => "u16",
            IntType::U32 => "u32",
            IntType::U64 => "u64",
            IntType::I8 => "i8",
            IntType::I16 => "i16",
            IntType::I32 => "i32",
            IntType::I64 => "i64",
        };
        TypeDescriptor::new(name, Kind::Int(width))
    }

    pub fn float(width: FloatType) -> TypeDescriptor {
        let name = match width {
            FloatType::F32 => "f32",
            FloatType::F64 => "f64",
        };
        TypeDescriptor::new(name, Kind::Float(width))
    }

    pub fn unicode() -> TypeDescriptor {
        TypeDescriptor::new("string", Kind::Unicode)
    }

    pub fn byte_string() -> TypeDescriptor {
        TypeDescriptor::new("bytes", Kind::ByteString)
    }

    pub fn time() -> TypeDescriptor {
        TypeDescriptor::new("time", Kind::Time)
    }
}
