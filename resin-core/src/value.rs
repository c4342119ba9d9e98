use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::time::Timestamp;

/// A runtime instance being encoded, or a decode target being populated.
///
/// Indirection is explicit: every `Pointer` is exactly one optional level,
/// and an `Interface` carries its concrete variant by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Any signed integer width.
    Int(i64),
    /// Any unsigned integer width.
    Uint(u64),
    Float(f64),
    Unicode(String),
    Bytes(Vec<u8>),
    Time(Timestamp),
    /// Elements of a sequence or of a fixed-length array.
    Sequence(Vec<Value>),
    /// Field values in descriptor order.
    Record(Vec<Value>),
    Pointer(Option<Box<Value>>),
    Interface(Option<Box<Variant>>),
    Opaque(Opaque),
}

/// The dynamic content of a non-nil interface value.
///
/// `value` is held in the form its concrete descriptor prefers: behind a
/// `Value::Pointer` for pointer-preferred variants, directly otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub value: Value,
}

impl Value {
    /// The zero value of a descriptor: false, 0, empty, nil, or the zero instant.
    pub fn zero(ty: &TypeDescriptor) -> Value {
        match ty.kind() {
            Kind::Bool => Value::Bool(false),
            Kind::Int(width) if width.is_signed() => Value::Int(0),
            Kind::Int(_) => Value::Uint(0),
            Kind::Float(_) => Value::Float(0.0),
            Kind::Unicode => Value::Unicode(String::new()),
            Kind::ByteString => Value::Bytes(Vec::new()),
            Kind::Time => Value::Time(Timestamp::ZERO),
            Kind::Sequence(_) => Value::Sequence(Vec::new()),
            Kind::Array { elem, len } => {
                Value::Sequence((0..*len).map(|_| Value::zero(elem)).collect())
            }
            Kind::Record(fields) => {
                Value::Record(fields.iter().map(|f| Value::zero(f.ty())).collect())
            }
            Kind::Pointer(_) => Value::Pointer(None),
            Kind::Interface(_) => Value::Interface(None),
            // Opaque descriptors are only built with a representation.
            Kind::Opaque => ty
                .representation()
                .map(|repr| repr.hook().zero())
                .unwrap_or(Value::Pointer(None)),
        }
    }

    /// A non-nil pointer to `inner`.
    pub fn pointer(inner: Value) -> Value {
        Value::Pointer(Some(Box::new(inner)))
    }

    pub fn nil() -> Value {
        Value::Pointer(None)
    }

    pub fn interface(name: impl Into<String>, value: Value) -> Value {
        Value::Interface(Some(Box::new(Variant {
            name: name.into(),
            value,
        })))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Unicode(_) => "unicode",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "time",
            Value::Sequence(_) => "sequence",
            Value::Record(_) => "record",
            Value::Pointer(_) => "pointer",
            Value::Interface(_) => "interface",
            Value::Opaque(_) => "opaque",
        }
    }

    pub fn as_record(&self) -> Option<&[Value]> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Contract error for a value whose shape disagrees with its descriptor.
pub(crate) fn mismatch(ty: &TypeDescriptor, value: &Value) -> CodecError {
    CodecError::contract(format!(
        "{} value does not match descriptor {} ({})",
        value.label(),
        ty.name(),
        ty.kind().label()
    ))
}

/// A value of an opaque type, only encodable through its representation.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
    debug: fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl Opaque {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
    {
        Opaque {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
            eq: opaque_eq::<T>,
            debug: opaque_debug::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

fn opaque_eq<T: Any + PartialEq>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn opaque_debug<T: Any + fmt::Debug>(v: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v.downcast_ref::<T>() {
        Some(v) => fmt::Debug::fmt(v, f),
        None => f.write_str("<opaque>"),
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        (self.eq)(self.inner.as_ref(), other.inner.as_ref())
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>(", self.type_name)?;
        (self.debug)(self.inner.as_ref(), f)?;
        f.write_str(")")
    }
}
