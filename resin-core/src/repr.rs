//! Custom representation hooks.
//!
//! A type may present an entirely different canonical shape than its
//! natural one (say, a big integer carried as decimal text). The walkers
//! ask [`to_representation`] for the object to encode and hand decoded
//! representation objects back through [`from_representation`].

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::error::{CodecError, HookError};
use crate::reflect::Reflect;
use crate::registry::Registry;
use crate::value::{Opaque, Value};

/// Dynamic marshal/unmarshal hook attached to a descriptor.
pub trait RepresentationHook: Send + Sync {
    /// Produces the representation object for `value`.
    fn marshal(&self, value: &Value) -> Result<Value, HookError>;

    /// Mutable-access variant, preferred when the caller holds the value
    /// mutably. Defaults to [`marshal`](Self::marshal).
    fn marshal_mut(&self, value: &mut Value) -> Result<Value, HookError> {
        self.marshal(value)
    }

    /// Rebuilds a value from its representation object.
    fn unmarshal(&self, repr: Value) -> Result<Value, HookError>;

    /// The zero value of the hooked type.
    fn zero(&self) -> Value;
}

/// A representation type together with the hook converting to and from it.
#[derive(Clone)]
pub struct Representation {
    descriptor: Arc<TypeDescriptor>,
    hook: Arc<dyn RepresentationHook>,
}

impl Representation {
    pub fn new(descriptor: Arc<TypeDescriptor>, hook: Arc<dyn RepresentationHook>) -> Self {
        Representation { descriptor, hook }
    }

    /// Representation of a typed [`CustomRepresentation`] implementor.
    pub fn typed<T: CustomRepresentation>(registry: &Registry) -> Result<Self, CodecError> {
        Ok(Representation {
            descriptor: registry.descriptor::<T::Repr>()?,
            hook: Arc::new(TypedHook::<T>::new()),
        })
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn hook(&self) -> &Arc<dyn RepresentationHook> {
        &self.hook
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("descriptor", &self.descriptor.name())
            .finish_non_exhaustive()
    }
}

/// Capability trait for Rust types with a custom canonical shape.
///
/// The implementing type is carried as a [`Value::Opaque`]; only its
/// representation ever reaches the encoded bytes.
pub trait CustomRepresentation:
    Any + Clone + Default + PartialEq + fmt::Debug + Send + Sync
{
    type Repr: Reflect;

    fn to_repr(&self) -> Result<Self::Repr, HookError>;

    fn from_repr(repr: Self::Repr) -> Result<Self, HookError>;
}

/// Adapter from [`CustomRepresentation`] to [`RepresentationHook`].
pub struct TypedHook<T>(PhantomData<fn() -> T>);

impl<T: CustomRepresentation> TypedHook<T> {
    pub fn new() -> Self {
        TypedHook(PhantomData)
    }
}

impl<T: CustomRepresentation> Default for TypedHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CustomRepresentation> RepresentationHook for TypedHook<T> {
    fn marshal(&self, value: &Value) -> Result<Value, HookError> {
        let typed = match value {
            Value::Opaque(opaque) => opaque.downcast_ref::<T>(),
            _ => None,
        };
        let typed = typed.ok_or_else(|| {
            format!(
                "expected opaque {}, got {} value",
                std::any::type_name::<T>(),
                value.label()
            )
        })?;
        Ok(typed.to_repr()?.to_value())
    }

    fn unmarshal(&self, repr: Value) -> Result<Value, HookError> {
        let repr = <T::Repr as Reflect>::from_value(repr)?;
        Ok(Value::Opaque(Opaque::new(T::from_repr(repr)?)))
    }

    fn zero(&self) -> Value {
        Value::Opaque(Opaque::new(T::default()))
    }
}

/// Substitutes the representation object for `value` if `ty` declares a hook.
///
/// Returns the object to encode together with its descriptor; without a
/// hook these are `value` and `ty` themselves.
pub fn to_representation<'a>(
    value: &'a Value,
    ty: &'a TypeDescriptor,
) -> Result<(Cow<'a, Value>, &'a TypeDescriptor), CodecError> {
    match ty.representation() {
        None => Ok((Cow::Borrowed(value), ty)),
        Some(repr) => {
            let object = repr.hook().marshal(value).map_err(|e| hook_failed(ty, e))?;
            Ok((Cow::Owned(object), repr.descriptor().as_ref()))
        }
    }
}

/// Like [`to_representation`], giving the hook mutable access to `value`.
pub fn to_representation_mut<'a>(
    value: &'a mut Value,
    ty: &'a TypeDescriptor,
) -> Result<(Cow<'a, Value>, &'a TypeDescriptor), CodecError> {
    match ty.representation() {
        None => Ok((Cow::Borrowed(&*value), ty)),
        Some(repr) => {
            let object = repr
                .hook()
                .marshal_mut(value)
                .map_err(|e| hook_failed(ty, e))?;
            Ok((Cow::Owned(object), repr.descriptor().as_ref()))
        }
    }
}

/// Inverse of [`to_representation`]: writes the value rebuilt from `object`
/// into `target`. Without a hook, `object` is stored as is.
pub fn from_representation(
    object: Value,
    ty: &TypeDescriptor,
    target: &mut Value,
) -> Result<(), CodecError> {
    *target = match ty.representation() {
        None => object,
        Some(repr) => repr.hook().unmarshal(object).map_err(|e| hook_failed(ty, e))?,
    };
    Ok(())
}

fn hook_failed(ty: &TypeDescriptor, source: HookError) -> CodecError {
    log::debug!("representation hook of {} failed: {source}", ty.name());
    CodecError::Hook {
        type_name: ty.name().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::primitives::{float, unicode};
    use crate::descriptor::{FieldDescriptor, FloatType};

    /// Unsigned amount carried as decimal text.
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Amount(u128);

    impl CustomRepresentation for Amount {
        type Repr = String;

        fn to_repr(&self) -> Result<String, HookError> {
            Ok(self.0.to_string())
        }

        fn from_repr(repr: String) -> Result<Self, HookError> {
            Ok(Amount(repr.parse()?))
        }
    }

    /// Fails on every marshal, as an out-of-range value would.
    struct Refusing;

    impl RepresentationHook for Refusing {
        fn marshal(&self, _value: &Value) -> Result<Value, HookError> {
            Err("value out of canonical range".into())
        }

        fn unmarshal(&self, repr: Value) -> Result<Value, HookError> {
            Ok(repr)
        }

        fn zero(&self) -> Value {
            Value::Unicode(String::new())
        }
    }

    fn amount_descriptor() -> TypeDescriptor {
        let repr = Representation::typed::<Amount>(&Registry::new()).unwrap();
        TypeDescriptor::opaque("Amount", repr)
    }

    #[test]
    fn no_hook_passes_value_through() {
        let ty = unicode();
        let value = Value::Unicode("plain".into());
        let (object, repr_ty) = to_representation(&value, &ty).unwrap();
        assert!(matches!(object, Cow::Borrowed(_)));
        assert_eq!(repr_ty.name(), "string");
    }

    #[test]
    fn typed_hook_substitutes_text() {
        let ty = amount_descriptor();
        let value = Value::Opaque(Opaque::new(Amount(340_282_366_920_938_463_463)));
        let (object, repr_ty) = to_representation(&value, &ty).unwrap();
        assert_eq!(
            object.into_owned(),
            Value::Unicode("340282366920938463463".into())
        );
        assert_eq!(repr_ty.name(), "string");
    }

    #[test]
    fn mutable_form_uses_same_hook() {
        let ty = amount_descriptor();
        let mut value = Value::Opaque(Opaque::new(Amount(5)));
        let (object, _) = to_representation_mut(&mut value, &ty).unwrap();
        assert_eq!(object.into_owned(), Value::Unicode("5".into()));
    }

    #[test]
    fn from_representation_rebuilds_opaque() {
        let ty = amount_descriptor();
        let mut target = Value::zero(&ty);
        assert_eq!(target, Value::Opaque(Opaque::new(Amount(0))));
        from_representation(Value::Unicode("42".into()), &ty, &mut target).unwrap();
        assert_eq!(target, Value::Opaque(Opaque::new(Amount(42))));
    }

    #[test]
    fn unmarshal_error_propagates_as_hook_error() {
        let ty = amount_descriptor();
        let mut target = Value::zero(&ty);
        let err = from_representation(Value::Unicode("forty".into()), &ty, &mut target)
            .unwrap_err();
        assert!(matches!(err, CodecError::Hook { ref type_name, .. } if type_name == "Amount"));
        assert!(!err.is_contract());
    }

    #[test]
    fn marshal_error_propagates_as_hook_error() {
        let ty = TypeDescriptor::opaque(
            "Refusing",
            Representation::new(Arc::new(unicode()), Arc::new(Refusing)),
        );
        let err = to_representation(&Value::Unicode("x".into()), &ty).unwrap_err();
        assert!(matches!(err, CodecError::Hook { .. }));
    }

    #[test]
    fn float_representation_trips_safety_gate() {
        let ty = Arc::new(TypeDescriptor::opaque(
            "Ratio",
            Representation::new(Arc::new(float(FloatType::F64)), Arc::new(Refusing)),
        ));
        let fields = vec![FieldDescriptor::new(1, "ratio", ty.clone())];
        assert!(matches!(
            TypeDescriptor::record("Holder", fields),
            Err(CodecError::UnsafeField { .. })
        ));
        let fields = vec![FieldDescriptor::new(1, "ratio", ty).with_unsafe(true)];
        assert!(TypeDescriptor::record("Holder", fields).is_ok());
    }
}
