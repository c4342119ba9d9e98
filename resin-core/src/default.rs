//! Default-value policy: what counts as "empty" for omission, and what an
//! absent field is initialized to on decode.

use crate::descriptor::{Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::time::Timestamp;
use crate::value::Value;

/// Returns true iff `value` is its kind's default.
///
/// Records are rejected: deciding that an all-zero record is "empty" costs a
/// full traversal and must be requested explicitly through
/// [`is_default_deep`].
///
/// Only the +0.0 bit pattern is a default float; -0.0 encodes differently
/// and is therefore a value. A time is default when it is the reference
/// instant, its canonical default.
pub fn is_default(value: &Value) -> Result<bool, CodecError> {
    Ok(match value {
        Value::Bool(b) => !b,
        Value::Int(n) => *n == 0,
        Value::Uint(n) => *n == 0,
        Value::Float(x) => x.to_bits() == 0,
        Value::Unicode(s) => s.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        Value::Time(t) => *t == Timestamp::REFERENCE,
        Value::Sequence(items) => items.is_empty(),
        Value::Pointer(p) => p.is_none(),
        Value::Interface(i) => i.is_none(),
        Value::Opaque(_) => false,
        Value::Record(_) => {
            return Err(CodecError::contract(
                "default check on a record value; use is_default_deep",
            ));
        }
    })
}

/// Recursive default check that also accepts records and fixed arrays.
///
/// A record is default when every field is; a non-empty sequence is default
/// when every element is (fixed-length arrays are never zero-length).
/// Allocated pointers are looked through, so a pointer to a default value
/// counts as default here even though [`is_default`] says otherwise.
pub fn is_default_deep(value: &Value) -> bool {
    match value {
        Value::Record(fields) => fields.iter().all(is_default_deep),
        Value::Sequence(items) => items.iter().all(is_default_deep),
        Value::Pointer(Some(inner)) => is_default_deep(inner),
        other => is_default(other).unwrap_or(false),
    }
}

/// The canonical "empty" value of `ty`.
///
/// Equal to [`Value::zero`] except where the temporal type is reachable
/// without crossing a nil pointer: times default to
/// [`Timestamp::REFERENCE`], a pointer chain ending in time is allocated
/// through every level, and records and fixed arrays hold the canonical
/// default of each field or element. Pointers to anything else stay nil.
/// A type represented as time is rebuilt from the reference instant.
pub fn canonical_default(ty: &TypeDescriptor) -> Value {
    let (innermost, depth) = ty.deref_all();
    if depth > 0 {
        if !is_temporal(innermost) {
            return Value::zero(ty);
        }
        let mut value = canonical_default(innermost);
        for _ in 0..depth {
            value = Value::pointer(value);
        }
        return value;
    }
    if let Some(repr) = ty.representation() {
        if !is_temporal(ty) {
            return Value::zero(ty);
        }
        return repr
            .hook()
            .unmarshal(canonical_default(repr.descriptor()))
            .unwrap_or_else(|_| Value::zero(ty));
    }
    match ty.kind() {
        Kind::Time => Value::Time(Timestamp::REFERENCE),
        Kind::Record(fields) => {
            Value::Record(fields.iter().map(|f| canonical_default(f.ty())).collect())
        }
        Kind::Array { elem, len } => {
            Value::Sequence((0..*len).map(|_| canonical_default(elem)).collect())
        }
        _ => Value::zero(ty),
    }
}

/// Time itself, or a type whose representation resolves to time.
fn is_temporal(ty: &TypeDescriptor) -> bool {
    match ty.representation() {
        Some(repr) => is_temporal(repr.descriptor().deref_all().0),
        None => matches!(ty.kind(), Kind::Time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::primitives::*;
    use crate::descriptor::{FieldDescriptor, FloatType, IntType};
    use std::sync::Arc;

    fn ptr(ty: TypeDescriptor) -> TypeDescriptor {
        TypeDescriptor::pointer(Arc::new(ty))
    }

    fn primitive_descriptors() -> Vec<TypeDescriptor> {
        vec![
            bool(),
            int(IntType::U8),
            int(IntType::U64),
            int(IntType::I32),
            int(IntType::I64),
            float(FloatType::F64),
            unicode(),
            byte_string(),
            TypeDescriptor::sequence(Arc::new(unicode())),
            ptr(int(IntType::I32)),
        ]
    }

    #[test]
    fn zero_values_are_default() {
        for ty in primitive_descriptors() {
            let zero = Value::zero(&ty);
            assert!(is_default(&zero).unwrap(), "zero of {} not default", ty.name());
        }
    }

    #[test]
    fn non_zero_values_are_not_default() {
        let values = [
            Value::Bool(true),
            Value::Int(-1),
            Value::Uint(1),
            Value::Float(0.5),
            Value::Float(-0.0),
            Value::Unicode("x".into()),
            Value::Bytes(vec![0]),
            Value::Sequence(vec![Value::Int(0)]),
            Value::pointer(Value::Int(0)),
            Value::interface("Circle", Value::Record(vec![])),
            Value::Time(Timestamp::ZERO),
        ];
        for v in &values {
            assert!(!is_default(v).unwrap(), "{v:?} reported default");
        }
    }

    #[test]
    fn record_default_check_is_contract_error() {
        let err = is_default(&Value::Record(vec![])).unwrap_err();
        assert!(err.is_contract());
    }

    #[test]
    fn deep_check_on_records() {
        let zero = Value::Record(vec![Value::Int(0), Value::Record(vec![Value::nil()])]);
        assert!(is_default_deep(&zero));
        let non_zero = Value::Record(vec![Value::Int(0), Value::Record(vec![Value::Bool(true)])]);
        assert!(!is_default_deep(&non_zero));
    }

    #[test]
    fn canonical_default_matches_zero_without_time() {
        for ty in primitive_descriptors() {
            assert_eq!(canonical_default(&ty), Value::zero(&ty));
        }
        let rec = TypeDescriptor::record(
            "Holder",
            vec![FieldDescriptor::new(1, "at", Arc::new(time()))],
        )
        .unwrap();
        assert_eq!(
            canonical_default(&rec),
            Value::Record(vec![Value::Time(Timestamp::REFERENCE)])
        );
        assert_ne!(canonical_default(&rec), Value::zero(&rec));
    }

    #[test]
    fn canonical_default_recurses_into_records_and_arrays() {
        let marks = TypeDescriptor::array(Arc::new(time()), 2);
        let inner = Arc::new(
            TypeDescriptor::record(
                "Inner",
                vec![
                    FieldDescriptor::new(1, "at", Arc::new(time())),
                    FieldDescriptor::new(2, "n", Arc::new(int(IntType::U8))),
                ],
            )
            .unwrap(),
        );
        let outer = TypeDescriptor::record(
            "Outer",
            vec![
                FieldDescriptor::new(1, "inner", inner.clone()),
                FieldDescriptor::new(2, "marks", Arc::new(marks)),
                FieldDescriptor::new(3, "boxed", Arc::new(ptr((*inner).clone()))),
            ],
        )
        .unwrap();
        let reference = Value::Time(Timestamp::REFERENCE);
        assert_eq!(
            canonical_default(&outer),
            Value::Record(vec![
                Value::Record(vec![reference.clone(), Value::Uint(0)]),
                Value::Sequence(vec![reference.clone(), reference]),
                Value::nil(),
            ])
        );
        assert!(is_default_deep(&canonical_default(&outer)));
    }

    #[test]
    fn time_representation_defaults_to_reference() {
        use chrono::{DateTime, Utc};

        let registry = crate::Registry::new();
        let ty = registry.descriptor::<Option<DateTime<Utc>>>().unwrap();
        let value = canonical_default(&ty);
        let Value::Pointer(Some(inner)) = &value else {
            panic!("pointer is nil: {value:?}");
        };
        let Value::Opaque(opaque) = inner.as_ref() else {
            panic!("expected opaque, got {inner:?}");
        };
        assert_eq!(
            opaque.downcast_ref::<DateTime<Utc>>(),
            Some(&DateTime::<Utc>::from(Timestamp::REFERENCE))
        );
    }

    #[test]
    fn deep_check_looks_through_pointers() {
        let ty = TypeDescriptor::record(
            "Seen",
            vec![FieldDescriptor::new(1, "at", Arc::new(ptr(time())))],
        )
        .unwrap();
        assert!(is_default_deep(&canonical_default(&ty)));
        assert!(!is_default_deep(&Value::Record(vec![Value::pointer(Value::Int(1))])));
    }

    #[test]
    fn canonical_default_of_time_is_reference() {
        assert_eq!(
            canonical_default(&time()),
            Value::Time(Timestamp::REFERENCE)
        );
    }

    #[test]
    fn canonical_default_through_pointer_chain() {
        let ty = ptr(ptr(time()));
        let value = canonical_default(&ty);
        let Value::Pointer(Some(outer)) = &value else {
            panic!("outer pointer is nil: {value:?}");
        };
        let Value::Pointer(Some(inner)) = outer.as_ref() else {
            panic!("inner pointer is nil: {outer:?}");
        };
        assert_eq!(inner.as_ref(), &Value::Time(Timestamp::REFERENCE));
    }

    #[test]
    fn canonical_default_at_every_depth() {
        let mut ty = time();
        for depth in 0..=3 {
            let mut value = canonical_default(&ty);
            for _ in 0..depth {
                value = match value {
                    Value::Pointer(Some(inner)) => *inner,
                    other => panic!("depth {depth}: expected pointer, got {other:?}"),
                };
            }
            assert_eq!(value, Value::Time(Timestamp::REFERENCE));
            ty = ptr(ty);
        }
    }
}
