//! Pointer and polymorphic indirection during encode and decode.

use std::sync::Arc;

use crate::descriptor::{Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::value::{Value, mismatch};

/// Result of stripping one level of indirection.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    /// The underlying value; `None` when the pointer was nil.
    pub value: Option<&'a Value>,
    /// Whether a pointer level was stripped.
    pub indirect: bool,
}

impl<'a> Resolved<'a> {
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Strips one pointer level. Non-pointers resolve to themselves.
pub fn resolve(value: &Value) -> Resolved<'_> {
    match value {
        Value::Pointer(inner) => Resolved {
            value: inner.as_deref(),
            indirect: true,
        },
        other => Resolved {
            value: Some(other),
            indirect: false,
        },
    }
}

/// Applies [`resolve`] until a non-pointer is reached; `None` if any level is nil.
pub fn resolve_all(value: &Value) -> Option<&Value> {
    let mut current = value;
    loop {
        let resolved = resolve(current);
        match resolved.value {
            Some(next) if resolved.indirect => current = next,
            other => return other,
        }
    }
}

/// True for a nil pointer or a nil interface.
///
/// Collections cannot be nil in this value model, and a zero scalar is a
/// value, not nil.
pub fn is_nilish(value: &Value) -> bool {
    matches!(value, Value::Pointer(None) | Value::Interface(None))
}

/// Single pointer step for decoding: allocates a zero pointee if `target` is
/// nil, then returns the pointee and its descriptor.
///
/// Unlike [`deref_and_construct`] this tolerates a pointee that is itself a
/// pointer, so walkers can descend multi-level pointers one level at a time.
pub fn construct_pointee<'a, 'b>(
    target: &'a mut Value,
    ty: &'b TypeDescriptor,
) -> Result<(&'a mut Value, &'b Arc<TypeDescriptor>), CodecError> {
    let pointee = ty.pointee()?;
    match target {
        Value::Pointer(slot) => {
            let inner = slot.get_or_insert_with(|| Box::new(Value::zero(pointee)));
            Ok((inner.as_mut(), pointee))
        }
        other => Err(mismatch(ty, other)),
    }
}

/// Dereferences a decode target, allocating a zero instance behind a nil
/// pointer first. Non-pointer targets are returned as they are.
///
/// A pointer to a pointer is a schema error: single indirection is expected.
/// An already-allocated pointer is reused, never reallocated.
pub fn deref_and_construct<'a>(
    target: &'a mut Value,
    ty: &TypeDescriptor,
) -> Result<&'a mut Value, CodecError> {
    match ty.kind() {
        Kind::Pointer(inner) => {
            if inner.is_pointer() {
                return Err(CodecError::contract(format!(
                    "unexpected pointer to pointer: {}",
                    ty.name()
                )));
            }
            construct_pointee(target, ty).map(|(value, _)| value)
        }
        _ if matches!(target, Value::Pointer(_)) => Err(mismatch(ty, target)),
        _ => Ok(target),
    }
}

/// A freshly constructed concrete variant for a polymorphic slot.
///
/// For pointer-preferred variants the assignable form is a pointer and the
/// instance is its pointee: writes through [`instance_mut`](Self::instance_mut)
/// are visible in the assignable value because they are the same allocation.
#[derive(Debug, Clone)]
pub struct ConcreteInstance {
    descriptor: Arc<TypeDescriptor>,
    assignable: Value,
}

impl ConcreteInstance {
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// The value to place into the polymorphic slot.
    pub fn assignable(&self) -> &Value {
        &self.assignable
    }

    pub fn instance(&self) -> &Value {
        match &self.assignable {
            Value::Pointer(Some(inner)) if self.descriptor.pointer_preferred() => inner.as_ref(),
            other => other,
        }
    }

    /// The settable instance that decoding writes into.
    pub fn instance_mut(&mut self) -> &mut Value {
        if !self.descriptor.pointer_preferred() {
            return &mut self.assignable;
        }
        match &mut self.assignable {
            Value::Pointer(Some(inner)) => inner.as_mut(),
            other => other,
        }
    }

    pub fn into_assignable(self) -> Value {
        self.assignable
    }

    /// Wraps the assignable form into an interface value.
    pub fn into_interface(self) -> Value {
        Value::interface(self.descriptor.name(), self.assignable)
    }
}

/// Builds a zero instance of a concrete variant, behind a pointer when the
/// variant is pointer-preferred.
pub fn construct_concrete(variant: &Arc<TypeDescriptor>) -> ConcreteInstance {
    let instance = Value::zero(variant);
    let assignable = if variant.pointer_preferred() {
        Value::pointer(instance)
    } else {
        instance
    };
    ConcreteInstance {
        descriptor: Arc::clone(variant),
        assignable,
    }
}

/// Like [`construct_concrete`] when no data is present: pointer-preferred
/// variants become a nil pointer instead of an allocated zero instance.
pub fn construct_concrete_nil_preferred(variant: &TypeDescriptor) -> Value {
    if variant.pointer_preferred() {
        log::trace!("nil-preferred construction of {}", variant.name());
        Value::nil()
    } else {
        Value::zero(variant)
    }
}
