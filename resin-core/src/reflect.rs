use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::descriptor::primitives;
use crate::descriptor::{FloatType, IntType, TypeDescriptor};
use crate::error::{CodecError, HookError};
use crate::registry::Registry;
use crate::repr::{CustomRepresentation, Representation};
use crate::time::Timestamp;
use crate::value::{Opaque, Value};

/// A static Rust type the codec can describe and convert to and from [`Value`].
///
/// Usually derived with `#[derive(Reflect)]`. Descriptors are obtained
/// through a [`Registry`], never by calling [`describe`](Reflect::describe)
/// directly, so each type is described once.
pub trait Reflect: Sized + 'static {
    /// The registered name; equal to the name of the descriptor.
    fn type_name() -> String;

    /// Builds the descriptor, fetching component descriptors from `registry`.
    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError>;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, CodecError>;
}

fn unexpected<T: Reflect>(value: &Value) -> CodecError {
    CodecError::contract(format!(
        "cannot convert {} value into {}",
        value.label(),
        T::type_name()
    ))
}

impl Reflect for bool {
    fn type_name() -> String {
        "bool".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::bool())
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

macro_rules! impl_reflect_int {
    ($t:ty, $variant:ident, $name:literal, $value:ident, $wide:ty) => {
        impl Reflect for $t {
            fn type_name() -> String {
                $name.into()
            }

            fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
                Ok(primitives::int(IntType::$variant))
            }

            fn to_value(&self) -> Value {
                Value::$value(<$wide>::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::$value(n) => <$t>::try_from(n).map_err(|_| {
                        CodecError::data(format!("{n} out of range for {}", $name))
                    }),
                    other => Err(unexpected::<Self>(&other)),
                }
            }
        }
    };
}

impl_reflect_int!(u8, U8, "u8", Uint, u64);
impl_reflect_int!(u16, U16, "u16", Uint, u64);
impl_reflect_int!(u32, U32, "u32", Uint, u64);
impl_reflect_int!(u64, U64, "u64", Uint, u64);
impl_reflect_int!(i8, I8, "i8", Int, i64);
impl_reflect_int!(i16, I16, "i16", Int, i64);
impl_reflect_int!(i32, I32, "i32", Int, i64);
impl_reflect_int!(i64, I64, "i64", Int, i64);

impl Reflect for f32 {
    fn type_name() -> String {
        "f32".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::float(FloatType::F32))
    }

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Float(x) => Ok(x as f32),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl Reflect for f64 {
    fn type_name() -> String {
        "f64".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::float(FloatType::F64))
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Float(x) => Ok(x),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl Reflect for String {
    fn type_name() -> String {
        "string".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::unicode())
    }

    fn to_value(&self) -> Value {
        Value::Unicode(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Unicode(s) => Ok(s),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

/// A byte string, distinguished from `Vec<u8>` (a sequence of integers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteString(pub Vec<u8>);

impl ByteString {
    pub fn new(data: Vec<u8>) -> Self {
        ByteString(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(v: Vec<u8>) -> Self {
        ByteString(v)
    }
}

impl From<&[u8]> for ByteString {
    fn from(v: &[u8]) -> Self {
        ByteString(v.to_vec())
    }
}

impl Reflect for ByteString {
    fn type_name() -> String {
        "bytes".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::byte_string())
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.0.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Bytes(b) => Ok(ByteString(b)),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl Reflect for Timestamp {
    fn type_name() -> String {
        "time".into()
    }

    fn describe(_registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(primitives::time())
    }

    fn to_value(&self) -> Value {
        Value::Time(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Time(t) => Ok(t),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

/// Carried through its [`Timestamp`] representation. An instant outside
/// the timestamp range fails to encode with a hook error.
impl CustomRepresentation for DateTime<Utc> {
    type Repr = Timestamp;

    fn to_repr(&self) -> Result<Timestamp, HookError> {
        Ok(Timestamp::try_from(*self)?)
    }

    fn from_repr(repr: Timestamp) -> Result<Self, HookError> {
        Ok(repr.into())
    }
}

impl Reflect for DateTime<Utc> {
    fn type_name() -> String {
        "datetime".into()
    }

    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        let repr = Representation::typed::<Self>(registry)?;
        Ok(TypeDescriptor::opaque(Self::type_name(), repr))
    }

    fn to_value(&self) -> Value {
        Value::Opaque(Opaque::new(*self))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        __private::from_opaque::<Self>(value)
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn type_name() -> String {
        format!("[]{}", T::type_name())
    }

    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(TypeDescriptor::sequence(registry.descriptor::<T>()?))
    }

    fn to_value(&self) -> Value {
        Value::Sequence(self.iter().map(Reflect::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Sequence(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn type_name() -> String {
        format!("[{N}]{}", T::type_name())
    }

    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(TypeDescriptor::array(registry.descriptor::<T>()?, N))
    }

    fn to_value(&self) -> Value {
        Value::Sequence(self.iter().map(Reflect::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        let items: Vec<T> = Vec::from_value(value)?;
        let len = items.len();
        <[T; N]>::try_from(items).map_err(|_| {
            CodecError::data(format!("expected {N} elements for {}, got {len}", Self::type_name()))
        })
    }
}

/// `Option<T>` is the pointer kind: `None` is the nil pointer.
impl<T: Reflect> Reflect for Option<T> {
    fn type_name() -> String {
        format!("*{}", T::type_name())
    }

    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(TypeDescriptor::pointer(registry.descriptor::<T>()?))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => Value::pointer(inner.to_value()),
            None => Value::nil(),
        }
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Pointer(Some(inner)) => T::from_value(*inner).map(Some),
            Value::Pointer(None) => Ok(None),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

/// Heap placement only; a `Box<T>` is described exactly as `T`.
impl<T: Reflect> Reflect for Box<T> {
    fn type_name() -> String {
        T::type_name()
    }

    fn describe(registry: &Registry) -> Result<TypeDescriptor, CodecError> {
        Ok(registry.descriptor::<T>()?.as_ref().clone())
    }

    fn to_value(&self) -> Value {
        self.as_ref().to_value()
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        T::from_value(value).map(Box::new)
    }
}

/// Support functions called by `#[derive(Reflect)]` output.
#[doc(hidden)]
pub mod __private {
    use super::*;
    use crate::repr::CustomRepresentation;
    use crate::value::Variant;

    pub fn record_fields(
        value: Value,
        expected: usize,
        type_name: &str,
    ) -> Result<std::vec::IntoIter<Value>, CodecError> {
        match value {
            Value::Record(fields) if fields.len() == expected => Ok(fields.into_iter()),
            Value::Record(fields) => Err(CodecError::contract(format!(
                "{type_name} has {expected} fields, record value has {}",
                fields.len()
            ))),
            other => Err(CodecError::contract(format!(
                "cannot convert {} value into {type_name}",
                other.label()
            ))),
        }
    }

    pub fn next_field<T: Reflect>(
        fields: &mut std::vec::IntoIter<Value>,
        type_name: &str,
        field: &str,
    ) -> Result<T, CodecError> {
        let value = fields
            .next()
            .ok_or_else(|| CodecError::contract(format!("{type_name}.{field} missing")))?;
        T::from_value(value)
    }

    /// Descriptor of a concrete variant held by value (`pointer == false`) or
    /// behind a box; the holding form must agree with the type's preference.
    pub fn variant<T: Reflect>(
        registry: &Registry,
        pointer: bool,
    ) -> Result<Arc<TypeDescriptor>, CodecError> {
        let ty = registry.descriptor::<T>()?;
        if ty.pointer_preferred() != pointer {
            return Err(CodecError::contract(format!(
                "variant {} is held {} but its type is {}pointer-preferred",
                ty.name(),
                if pointer { "boxed" } else { "by value" },
                if ty.pointer_preferred() { "" } else { "not " }
            )));
        }
        Ok(ty)
    }

    pub fn interface_parts(value: Value, type_name: &str) -> Result<Option<Variant>, CodecError> {
        match value {
            Value::Interface(inner) => Ok(inner.map(|v| *v)),
            other => Err(CodecError::contract(format!(
                "cannot convert {} value into {type_name}",
                other.label()
            ))),
        }
    }

    /// Converts the pointer form of a boxed variant; nil is refused.
    pub fn unbox<T: Reflect>(value: Value) -> Result<Box<T>, CodecError> {
        match Option::<Box<T>>::from_value(value)? {
            Some(inner) => Ok(inner),
            None => Err(CodecError::data(format!(
                "nil {} held where a value is required",
                T::type_name()
            ))),
        }
    }

    pub fn nil_interface(type_name: &str) -> CodecError {
        CodecError::data(format!("{type_name} has no nil variant"))
    }

    pub fn unknown_variant(type_name: &str, variant: &str) -> CodecError {
        CodecError::Unregistered(format!("{variant} in {type_name}"))
    }

    pub fn from_opaque<T: CustomRepresentation>(value: Value) -> Result<T, CodecError> {
        match &value {
            Value::Opaque(opaque) => opaque.downcast_ref::<T>().cloned().ok_or_else(|| {
                CodecError::contract(format!(
                    "opaque {} is not a {}",
                    opaque.type_name(),
                    std::any::type_name::<T>()
                ))
            }),
            other => Err(CodecError::contract(format!(
                "cannot convert {} value into {}",
                other.label(),
                std::any::type_name::<T>()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Kind;

    #[test]
    fn integer_values_and_ranges() {
        assert_eq!(7u8.to_value(), Value::Uint(7));
        assert_eq!((-7i16).to_value(), Value::Int(-7));
        assert_eq!(u8::from_value(Value::Uint(255)).unwrap(), 255);
        assert!(matches!(
            u8::from_value(Value::Uint(256)),
            Err(CodecError::Data(_))
        ));
        assert!(i32::from_value(Value::Uint(1)).unwrap_err().is_contract());
    }

    #[test]
    fn option_is_pointer() {
        let registry = Registry::new();
        let ty = registry.descriptor::<Option<u32>>().unwrap();
        assert_eq!(ty.name(), "*u32");
        assert_eq!(Option::<u32>::type_name(), "*u32");
        assert_eq!(Some(3u32).to_value(), Value::pointer(Value::Uint(3)));
        assert_eq!(None::<u32>.to_value(), Value::nil());
        assert_eq!(Option::<u32>::from_value(Value::nil()).unwrap(), None);
    }

    #[test]
    fn box_is_transparent() {
        let registry = Registry::new();
        let ty = registry.descriptor::<Box<String>>().unwrap();
        assert!(matches!(ty.kind(), Kind::Unicode));
        let b = Box::new("x".to_string());
        assert_eq!(b.to_value(), Value::Unicode("x".into()));
    }

    #[test]
    fn array_length_is_checked() {
        let value = Value::Sequence(vec![Value::Uint(1), Value::Uint(2)]);
        assert_eq!(<[u8; 2]>::from_value(value.clone()).unwrap(), [1, 2]);
        assert!(<[u8; 3]>::from_value(value).is_err());
        let registry = Registry::new();
        assert_eq!(registry.descriptor::<[u8; 3]>().unwrap().name(), "[3]u8");
    }

    #[test]
    fn type_names_match_descriptor_names() {
        fn check<T: Reflect>(registry: &Registry) {
            assert_eq!(registry.descriptor::<T>().unwrap().name(), T::type_name());
        }
        let registry = Registry::new();
        check::<bool>(&registry);
        check::<i64>(&registry);
        check::<f32>(&registry);
        check::<String>(&registry);
        check::<ByteString>(&registry);
        check::<Timestamp>(&registry);
        check::<DateTime<Utc>>(&registry);
        check::<Vec<Option<u16>>>(&registry);
        check::<[String; 4]>(&registry);
    }

    #[test]
    fn datetime_through_timestamp() {
        let registry = Registry::new();
        let ty = registry.descriptor::<DateTime<Utc>>().unwrap();
        let dt = DateTime::<Utc>::from_timestamp(1_700_000_000, 5).unwrap();
        let value = dt.to_value();

        let (object, repr_ty) = crate::to_representation(&value, &ty).unwrap();
        assert_eq!(
            object.into_owned(),
            Value::Time(Timestamp::new(1_700_000_000, 5).unwrap())
        );
        assert!(matches!(repr_ty.kind(), Kind::Time));
        assert_eq!(DateTime::<Utc>::from_value(value).unwrap(), dt);
    }

    #[test]
    fn datetime_outside_timestamp_range_fails() {
        let registry = Registry::new();
        let ty = registry.descriptor::<DateTime<Utc>>().unwrap();
        let far = DateTime::<Utc>::from_timestamp(316_592_582_400, 0).unwrap();
        let err = crate::to_representation(&far.to_value(), &ty).unwrap_err();
        assert!(matches!(err, CodecError::Hook { .. }));
    }

    #[cfg(feature = "derive")]
    mod derived {
        use crate::{Reflect, Registry, Value};

        #[derive(Debug, PartialEq, Reflect)]
        #[resin(crate = crate)]
        struct Point {
            x: i32,
            #[resin(index = 5, rename = "why")]
            y: i32,
            #[resin(skip)]
            cached: u8,
        }

        #[test]
        fn derive_inside_the_crate() {
            let registry = Registry::new();
            let ty = registry.descriptor::<Point>().unwrap();
            let layout: Vec<_> = ty.fields().iter().map(|f| (f.index(), f.name())).collect();
            assert_eq!(layout, vec![(1, "x"), (5, "why")]);

            let point = Point { x: 1, y: 2, cached: 9 };
            let value = point.to_value();
            assert_eq!(value, Value::Record(vec![Value::Int(1), Value::Int(2)]));
            assert_eq!(
                Point::from_value(value).unwrap(),
                Point { x: 1, y: 2, cached: 0 }
            );
        }
    }

    #[test]
    fn byte_string_is_not_a_sequence() {
        let registry = Registry::new();
        assert!(matches!(
            registry.descriptor::<ByteString>().unwrap().kind(),
            Kind::ByteString
        ));
        assert!(matches!(
            registry.descriptor::<Vec<u8>>().unwrap().kind(),
            Kind::Sequence(_)
        ));
        let bs = ByteString::from(&b"abc"[..]);
        assert_eq!(bs.to_value(), Value::Bytes(b"abc".to_vec()));
    }
}
