use crate::descriptor::{FieldDescriptor, Kind, TypeDescriptor};
use crate::error::CodecError;

/// Rejects a field whose declared type, or whose representation type, is
/// floating point, unless the field is explicitly marked unsafe.
///
/// Pointer, sequence and array wrappers are looked through. Called once per
/// field when a record descriptor is built.
pub fn check_safety(field: &FieldDescriptor) -> Result<(), CodecError> {
    if field.is_unsafe() {
        return Ok(());
    }
    let declared = field.ty();
    let offending = float_within(declared).or_else(|| {
        declared
            .representation()
            .and_then(|repr| float_within(repr.descriptor()))
    });
    match offending {
        Some(ty) => {
            log::warn!(
                "rejecting field {} of type {}: floating point is not deterministic",
                field.name(),
                declared.name()
            );
            Err(CodecError::UnsafeField {
                field: field.name().to_string(),
                type_name: ty.name().to_string(),
            })
        }
        None => Ok(()),
    }
}

fn float_within(ty: &TypeDescriptor) -> Option<&TypeDescriptor> {
    match ty.kind() {
        Kind::Float(_) => Some(ty),
        Kind::Pointer(inner) | Kind::Sequence(inner) | Kind::Array { elem: inner, .. } => {
            float_within(inner).or_else(|| {
                inner
                    .representation()
                    .and_then(|repr| float_within(repr.descriptor()))
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::primitives::{float, int, unicode};
    use crate::descriptor::{FloatType, IntType};
    use std::sync::Arc;

    fn field(ty: TypeDescriptor) -> FieldDescriptor {
        FieldDescriptor::new(1, "amount", Arc::new(ty))
    }

    #[test]
    fn float_field_rejected() {
        let err = check_safety(&field(float(FloatType::F64))).unwrap_err();
        assert!(matches!(err, CodecError::UnsafeField { ref field, .. } if field == "amount"));
    }

    #[test]
    fn float_field_allowed_when_unsafe() {
        assert!(check_safety(&field(float(FloatType::F32)).with_unsafe(true)).is_ok());
    }

    #[test]
    fn pointer_to_float_rejected() {
        let ptr = TypeDescriptor::pointer(Arc::new(float(FloatType::F64)));
        assert!(check_safety(&field(ptr)).is_err());
    }

    #[test]
    fn sequence_of_float_rejected() {
        let seq = TypeDescriptor::sequence(Arc::new(float(FloatType::F32)));
        assert!(check_safety(&field(seq)).is_err());
    }

    #[test]
    fn non_float_fields_pass() {
        assert!(check_safety(&field(int(IntType::I64))).is_ok());
        assert!(check_safety(&field(unicode())).is_ok());
    }

    #[test]
    fn record_construction_runs_gate() {
        let fields = vec![FieldDescriptor::new(1, "ratio", Arc::new(float(FloatType::F64)))];
        assert!(TypeDescriptor::record("Ratio", fields.clone()).is_err());

        let fields: Vec<_> = fields.into_iter().map(|f| f.with_unsafe(true)).collect();
        assert!(TypeDescriptor::record("Ratio", fields).is_ok());
    }
}
