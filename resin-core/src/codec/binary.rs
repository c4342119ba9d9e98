//! Canonical CBOR walker.
//!
//! Layout:
//! - records are maps keyed by field index in ascending order; empty fields
//!   are always omitted and decode to their canonical default
//! - a time is `[seconds, nanos]`
//! - a nil pointer is `null` (only observable inside sequences)
//! - an interface is `[prefix, payload]`, a typed nil `[prefix]`, a nil
//!   interface `null`; the tagless `[]` is accepted on decode only

use ciborium::Value as Cbor;

use crate::codec::is_empty;
use crate::default::canonical_default;
use crate::descriptor::{IntType, Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::indirect::{
    construct_concrete, construct_concrete_nil_preferred, construct_pointee, deref_and_construct,
};
use crate::key::Prefix;
use crate::repr::{from_representation, to_representation};
use crate::time::Timestamp;
use crate::value::{Value, mismatch};

pub fn encode_binary(value: &Value, ty: &TypeDescriptor) -> Result<Vec<u8>, CodecError> {
    let tree = encode_value(value, ty)?;
    let mut buf = Vec::new();
    ciborium::into_writer(&tree, &mut buf).map_err(|e| CodecError::Cbor(e.to_string()))?;
    Ok(buf)
}

/// Decodes `bytes` into a fresh zero value of `ty`.
pub fn decode_binary(bytes: &[u8], ty: &TypeDescriptor) -> Result<Value, CodecError> {
    let mut target = Value::zero(ty);
    decode_binary_into(bytes, ty, &mut target)?;
    Ok(target)
}

/// Decodes `bytes` into an existing target, reusing its pointer allocations
/// and, for tagless interfaces, its current concrete variant.
pub fn decode_binary_into(
    bytes: &[u8],
    ty: &TypeDescriptor,
    target: &mut Value,
) -> Result<(), CodecError> {
    let mut reader = bytes;
    let tree: Cbor =
        ciborium::from_reader(&mut reader).map_err(|e| CodecError::Cbor(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::data(format!(
            "{} trailing bytes after value",
            reader.len()
        )));
    }
    decode_value(&tree, ty, target)
}

fn encode_value(value: &Value, ty: &TypeDescriptor) -> Result<Cbor, CodecError> {
    if ty.representation().is_some() {
        let (object, repr_ty) = to_representation(value, ty)?;
        return encode_value(&object, repr_ty);
    }

    Ok(match (ty.kind(), value) {
        (Kind::Bool, Value::Bool(b)) => Cbor::Bool(*b),
        (Kind::Int(width), Value::Int(n)) => {
            check_int(*width, i128::from(*n), ty)?;
            Cbor::Integer((*n).into())
        }
        (Kind::Int(width), Value::Uint(n)) => {
            check_int(*width, i128::from(*n), ty)?;
            Cbor::Integer((*n).into())
        }
        (Kind::Float(_), Value::Float(x)) => Cbor::Float(*x),
        (Kind::Unicode, Value::Unicode(s)) => Cbor::Text(s.clone()),
        (Kind::ByteString, Value::Bytes(b)) => Cbor::Bytes(b.clone()),
        (Kind::Time, Value::Time(t)) => Cbor::Array(vec![
            Cbor::Integer(t.seconds().into()),
            Cbor::Integer(t.nanos().into()),
        ]),
        (Kind::Sequence(elem), Value::Sequence(items)) => Cbor::Array(
            items
                .iter()
                .map(|item| encode_value(item, elem))
                .collect::<Result<_, _>>()?,
        ),
        (Kind::Array { elem, len }, Value::Sequence(items)) => {
            if items.len() != *len {
                return Err(CodecError::contract(format!(
                    "{} holds {} elements",
                    ty.name(),
                    items.len()
                )));
            }
            Cbor::Array(
                items
                    .iter()
                    .map(|item| encode_value(item, elem))
                    .collect::<Result<_, _>>()?,
            )
        }
        (Kind::Record(fields), Value::Record(values)) if fields.len() == values.len() => {
            let mut order: Vec<usize> = (0..fields.len()).collect();
            order.sort_by_key(|&i| fields[i].index());
            let mut entries = Vec::with_capacity(fields.len());
            for i in order {
                let field = &fields[i];
                if is_empty(&values[i], field.ty())? {
                    continue;
                }
                entries.push((
                    Cbor::Integer(field.index().into()),
                    encode_value(&values[i], field.ty())?,
                ));
            }
            Cbor::Map(entries)
        }
        (Kind::Pointer(inner), Value::Pointer(pointee)) => match pointee {
            None => Cbor::Null,
            Some(pointee) => encode_value(pointee, inner)?,
        },
        (Kind::Interface(iface), Value::Interface(variant)) => {
            let Some(variant) = variant else {
                return Ok(Cbor::Null);
            };
            let (Some(concrete), Some(prefix)) =
                (iface.variant(&variant.name), iface.prefix_of(&variant.name))
            else {
                return Err(CodecError::Unregistered(format!(
                    "{} in {}",
                    variant.name,
                    ty.name()
                )));
            };
            let tag = Cbor::Bytes(prefix.as_bytes().to_vec());
            match (&variant.value, concrete.pointer_preferred()) {
                (Value::Pointer(None), true) => Cbor::Array(vec![tag]),
                (Value::Pointer(Some(instance)), true) => {
                    Cbor::Array(vec![tag, encode_value(instance, concrete)?])
                }
                (instance, false) => Cbor::Array(vec![tag, encode_value(instance, concrete)?]),
                (other, true) => return Err(mismatch(concrete, other)),
            }
        }
        (Kind::Opaque, _) => {
            return Err(CodecError::contract(format!(
                "opaque type {} has no representation",
                ty.name()
            )));
        }
        (_, other) => return Err(mismatch(ty, other)),
    })
}

fn check_int(width: IntType, n: i128, ty: &TypeDescriptor) -> Result<(), CodecError> {
    if width.contains(n) {
        Ok(())
    } else {
        Err(CodecError::contract(format!("{n} out of range for {}", ty.name())))
    }
}

fn decode_value(node: &Cbor, ty: &TypeDescriptor, target: &mut Value) -> Result<(), CodecError> {
    if let Some(repr) = ty.representation() {
        let repr_ty = repr.descriptor();
        let mut object = Value::zero(repr_ty);
        decode_value(node, repr_ty, &mut object)?;
        return from_representation(object, ty, target);
    }

    match ty.kind() {
        Kind::Pointer(inner) => {
            if node.is_null() {
                *target = Value::nil();
                return Ok(());
            }
            if inner.is_pointer() {
                let (pointee, inner_ty) = construct_pointee(target, ty)?;
                decode_value(node, inner_ty, pointee)
            } else {
                let pointee = deref_and_construct(target, ty)?;
                decode_value(node, inner, pointee)
            }
        }
        Kind::Bool => {
            let b = node.as_bool().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Bool(b);
            Ok(())
        }
        Kind::Int(width) => {
            let n = decode_int(node, *width, ty)?;
            *target = int_value(*width, n);
            Ok(())
        }
        Kind::Float(_) => {
            let x = node.as_float().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Float(x);
            Ok(())
        }
        Kind::Unicode => {
            let s = node.as_text().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Unicode(s.to_string());
            Ok(())
        }
        Kind::ByteString => {
            let b = node.as_bytes().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Bytes(b.clone());
            Ok(())
        }
        Kind::Time => {
            let parts = node.as_array().ok_or_else(|| unexpected(ty, node))?;
            let [seconds, nanos] = parts.as_slice() else {
                return Err(CodecError::data(format!(
                    "time must be [seconds, nanos], got {} elements",
                    parts.len()
                )));
            };
            let seconds = decode_int(seconds, IntType::I64, ty)?;
            let nanos = decode_int(nanos, IntType::U32, ty)?;
            *target = Value::Time(Timestamp::new(seconds as i64, nanos as u32)?);
            Ok(())
        }
        Kind::Sequence(elem) => {
            let items = node.as_array().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Sequence(decode_elements(items, elem)?);
            Ok(())
        }
        Kind::Array { elem, len } => {
            let items = node.as_array().ok_or_else(|| unexpected(ty, node))?;
            if items.len() != *len {
                return Err(CodecError::data(format!(
                    "{} expects {len} elements, got {}",
                    ty.name(),
                    items.len()
                )));
            }
            *target = Value::Sequence(decode_elements(items, elem)?);
            Ok(())
        }
        Kind::Record(fields) => {
            let entries = node.as_map().ok_or_else(|| unexpected(ty, node))?;
            if target.as_record().map(<[Value]>::len) != Some(fields.len()) {
                *target = Value::zero(ty);
            }
            let slots = target.as_record_mut().ok_or_else(|| {
                CodecError::contract(format!("{} target is not a record", ty.name()))
            })?;

            let mut present = vec![false; fields.len()];
            let mut last = 0u32;
            for (key, node) in entries {
                let index = decode_int(key, IntType::U32, ty)? as u32;
                if index <= last {
                    return Err(CodecError::data(format!(
                        "{}: field key {index} duplicated or out of order",
                        ty.name()
                    )));
                }
                last = index;
                let pos = fields
                    .iter()
                    .position(|f| f.index() == index)
                    .ok_or_else(|| {
                        CodecError::data(format!("{}: unknown field key {index}", ty.name()))
                    })?;
                decode_value(node, fields[pos].ty(), &mut slots[pos])?;
                present[pos] = true;
            }
            for (pos, field) in fields.iter().enumerate() {
                if !present[pos] {
                    slots[pos] = canonical_default(field.ty());
                }
            }
            Ok(())
        }
        Kind::Interface(iface) => {
            if node.is_null() {
                *target = Value::Interface(None);
                return Ok(());
            }
            let parts = node.as_array().ok_or_else(|| unexpected(ty, node))?;
            let Some((tag, payload)) = parts.split_first() else {
                // Tagless: keep the target's current variant, nil-preferred.
                let current = match target {
                    Value::Interface(Some(variant)) => iface.variant(&variant.name).cloned(),
                    _ => None,
                };
                *target = match current {
                    Some(concrete) => {
                        log::trace!("tagless {} decoded as {}", ty.name(), concrete.name());
                        Value::interface(
                            concrete.name(),
                            construct_concrete_nil_preferred(&concrete),
                        )
                    }
                    None => Value::Interface(None),
                };
                return Ok(());
            };

            let prefix = tag
                .as_bytes()
                .and_then(|b| Prefix::from_bytes(b))
                .ok_or_else(|| CodecError::data(format!("{}: malformed prefix", ty.name())))?;
            let concrete = iface.variant_by_prefix(prefix).ok_or_else(|| {
                CodecError::Unregistered(format!("prefix {prefix} in {}", ty.name()))
            })?;
            match payload {
                [] if concrete.pointer_preferred() => {
                    *target = Value::interface(concrete.name(), Value::nil());
                    Ok(())
                }
                [] => Err(CodecError::data(format!(
                    "typed nil for by-value variant {}",
                    concrete.name()
                ))),
                [payload] => {
                    let mut instance = construct_concrete(concrete);
                    decode_value(payload, concrete, instance.instance_mut())?;
                    *target = instance.into_interface();
                    Ok(())
                }
                _ => Err(CodecError::data(format!(
                    "{}: interface holds {} elements",
                    ty.name(),
                    parts.len()
                ))),
            }
        }
        Kind::Opaque => Err(CodecError::contract(format!(
            "opaque type {} has no representation",
            ty.name()
        ))),
    }
}

fn decode_elements(items: &[Cbor], elem: &TypeDescriptor) -> Result<Vec<Value>, CodecError> {
    items
        .iter()
        .map(|item| {
            let mut value = Value::zero(elem);
            decode_value(item, elem, &mut value)?;
            Ok(value)
        })
        .collect()
}

fn decode_int(node: &Cbor, width: IntType, ty: &TypeDescriptor) -> Result<i128, CodecError> {
    let n = node
        .as_integer()
        .map(i128::from)
        .ok_or_else(|| unexpected(ty, node))?;
    if !width.contains(n) {
        return Err(CodecError::data(format!("{n} out of range for {}", ty.name())));
    }
    Ok(n)
}

/// Only called with values already checked against `width`.
pub(crate) fn int_value(width: IntType, n: i128) -> Value {
    if width.is_signed() {
        Value::Int(n as i64)
    } else {
        Value::Uint(n as u64)
    }
}

fn unexpected(ty: &TypeDescriptor, node: &Cbor) -> CodecError {
    let found = match node {
        Cbor::Integer(_) => "integer",
        Cbor::Bytes(_) => "bytes",
        Cbor::Float(_) => "float",
        Cbor::Text(_) => "text",
        Cbor::Bool(_) => "bool",
        Cbor::Null => "null",
        Cbor::Tag(..) => "tag",
        Cbor::Array(_) => "array",
        Cbor::Map(_) => "map",
        _ => "unknown item",
    };
    CodecError::data(format!(
        "expected {} for {}, found {found}",
        ty.kind().label(),
        ty.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::primitives::*;
    use crate::descriptor::{FieldDescriptor, FloatType};
    use std::sync::Arc;

    fn record(name: &str, fields: Vec<FieldDescriptor>) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::record(name, fields).unwrap())
    }

    fn payment() -> Arc<TypeDescriptor> {
        record(
            "Payment",
            vec![
                FieldDescriptor::new(
                    1,
                    "timestamp",
                    Arc::new(TypeDescriptor::pointer(Arc::new(time()))),
                ),
                FieldDescriptor::new(2, "amount", Arc::new(float(FloatType::F64)))
                    .with_unsafe(true),
                FieldDescriptor::new(3, "note", Arc::new(unicode())),
            ],
        )
    }

    fn shapes() -> (Arc<TypeDescriptor>, Arc<TypeDescriptor>, TypeDescriptor) {
        let side = Arc::new(int(IntType::U32));
        let circle = record("Circle", vec![FieldDescriptor::new(1, "r", side.clone())]);
        let square = Arc::new(
            TypeDescriptor::record("Square", vec![FieldDescriptor::new(1, "side", side)])
                .unwrap()
                .with_pointer_preferred(true),
        );
        let shape = TypeDescriptor::interface("Shape", [circle.clone(), square.clone()]).unwrap();
        (circle, square, shape)
    }

    #[test]
    fn all_zero_record_encodes_as_empty_map() {
        let ty = payment();
        let bytes = encode_binary(&Value::zero(&ty), &ty).unwrap();
        assert_eq!(bytes, vec![0xa0]);

        let decoded = decode_binary(&bytes, &ty).unwrap();
        assert_eq!(
            decoded,
            Value::Record(vec![
                Value::pointer(Value::Time(Timestamp::REFERENCE)),
                Value::Float(0.0),
                Value::Unicode(String::new()),
            ])
        );
    }

    #[test]
    fn reference_time_behind_pointer_is_omitted() {
        let ty = payment();
        let value = Value::Record(vec![
            Value::pointer(Value::Time(Timestamp::REFERENCE)),
            Value::Float(0.0),
            Value::Unicode(String::new()),
        ]);
        assert_eq!(encode_binary(&value, &ty).unwrap(), vec![0xa0]);
    }

    #[test]
    fn fields_are_keyed_by_ascending_index() {
        let ty = record(
            "Backwards",
            vec![
                FieldDescriptor::new(2, "b", Arc::new(bool())),
                FieldDescriptor::new(1, "a", Arc::new(bool())),
            ],
        );
        let value = Value::Record(vec![Value::Bool(true), Value::Bool(true)]);
        let bytes = encode_binary(&value, &ty).unwrap();
        // {1: true, 2: true}
        assert_eq!(bytes, vec![0xa2, 0x01, 0xf5, 0x02, 0xf5]);
        assert_eq!(decode_binary(&bytes, &ty).unwrap(), value);
    }

    #[test]
    fn out_of_order_keys_rejected() {
        let ty = record(
            "Pair",
            vec![
                FieldDescriptor::new(1, "a", Arc::new(bool())),
                FieldDescriptor::new(2, "b", Arc::new(bool())),
            ],
        );
        let err = decode_binary(&[0xa2, 0x02, 0xf5, 0x01, 0xf5], &ty).unwrap_err();
        assert!(matches!(err, CodecError::Data(_)));
        let err = decode_binary(&[0xa2, 0x01, 0xf5, 0x01, 0xf5], &ty).unwrap_err();
        assert!(matches!(err, CodecError::Data(_)));
        let err = decode_binary(&[0xa1, 0x07, 0xf5], &ty).unwrap_err();
        assert!(matches!(err, CodecError::Data(_)));
    }

    #[test]
    fn integers_are_range_checked_on_decode() {
        let ty = int(IntType::U8);
        // 256
        assert!(decode_binary(&[0x19, 0x01, 0x00], &ty).is_err());
        assert_eq!(decode_binary(&[0x18, 0xff], &ty).unwrap(), Value::Uint(255));
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert!(decode_binary(&[0xf5, 0xf5], &bool()).is_err());
    }

    #[test]
    fn nil_pointer_in_sequence_is_null() {
        let ty = TypeDescriptor::sequence(Arc::new(TypeDescriptor::pointer(Arc::new(unicode()))));
        let value = Value::Sequence(vec![Value::nil(), Value::pointer(Value::Unicode("a".into()))]);
        let bytes = encode_binary(&value, &ty).unwrap();
        assert_eq!(bytes, vec![0x82, 0xf6, 0x61, b'a']);
        assert_eq!(decode_binary(&bytes, &ty).unwrap(), value);
    }

    #[test]
    fn interface_by_value_and_pointer_preferred() {
        let (_, _, shape) = shapes();
        let circle = Value::interface("Circle", Value::Record(vec![Value::Uint(3)]));
        let bytes = encode_binary(&circle, &shape).unwrap();
        assert_eq!(decode_binary(&bytes, &shape).unwrap(), circle);

        let square = Value::interface(
            "Square",
            Value::pointer(Value::Record(vec![Value::Uint(4)])),
        );
        let bytes = encode_binary(&square, &shape).unwrap();
        assert_eq!(decode_binary(&bytes, &shape).unwrap(), square);
    }

    #[test]
    fn typed_nil_is_prefix_only() {
        let (_, _, shape) = shapes();
        let typed_nil = Value::interface("Square", Value::nil());
        let bytes = encode_binary(&typed_nil, &shape).unwrap();
        let prefix = Prefix::from_name("Square");
        let mut expected = vec![0x81, 0x44];
        expected.extend_from_slice(prefix.as_bytes());
        assert_eq!(bytes, expected);
        assert_eq!(decode_binary(&bytes, &shape).unwrap(), typed_nil);
    }

    #[test]
    fn nil_interface_is_null() {
        let (_, _, shape) = shapes();
        let bytes = encode_binary(&Value::Interface(None), &shape).unwrap();
        assert_eq!(bytes, vec![0xf6]);
    }

    #[test]
    fn tagless_decode_keeps_pointer_preferred_variant_as_nil() {
        let (_, _, shape) = shapes();
        let mut target = Value::interface(
            "Square",
            Value::pointer(Value::Record(vec![Value::Uint(9)])),
        );
        decode_binary_into(&[0x80], &shape, &mut target).unwrap();
        assert_eq!(target, Value::interface("Square", Value::nil()));
    }

    #[test]
    fn tagless_decode_by_value_variant_is_zero() {
        let (_, _, shape) = shapes();
        let mut target = Value::interface("Circle", Value::Record(vec![Value::Uint(9)]));
        decode_binary_into(&[0x80], &shape, &mut target).unwrap();
        assert_eq!(target, Value::interface("Circle", Value::Record(vec![Value::Uint(0)])));

        let mut empty = Value::Interface(None);
        decode_binary_into(&[0x80], &shape, &mut empty).unwrap();
        assert_eq!(empty, Value::Interface(None));
    }

    #[test]
    fn unknown_prefix_is_unregistered() {
        let (_, _, shape) = shapes();
        let err = decode_binary(&[0x82, 0x44, 1, 2, 3, 4, 0xa0], &shape).unwrap_err();
        assert!(matches!(err, CodecError::Unregistered(_)));
    }

    #[test]
    fn unregistered_variant_on_encode() {
        let (_, _, shape) = shapes();
        let err = encode_binary(&Value::interface("Hexagon", Value::Record(vec![])), &shape)
            .unwrap_err();
        assert!(matches!(err, CodecError::Unregistered(_)));
    }

    #[test]
    fn existing_pointer_allocation_is_reused() {
        let inner = record(
            "Inner",
            vec![FieldDescriptor::new(1, "n", Arc::new(int(IntType::I32)))],
        );
        let ty = TypeDescriptor::pointer(inner);
        let mut target = Value::pointer(Value::Record(vec![Value::Int(1)]));
        decode_binary_into(&[0xa1, 0x01, 0x05], &ty, &mut target).unwrap();
        assert_eq!(target, Value::pointer(Value::Record(vec![Value::Int(5)])));
    }

    #[test]
    fn pointer_to_pointer_descends_level_by_level() {
        let ty = TypeDescriptor::pointer(Arc::new(TypeDescriptor::pointer(Arc::new(int(
            IntType::I64,
        )))));
        let value = Value::pointer(Value::pointer(Value::Int(-2)));
        let bytes = encode_binary(&value, &ty).unwrap();
        assert_eq!(bytes, vec![0x21]);
        assert_eq!(decode_binary(&bytes, &ty).unwrap(), value);
    }

    #[test]
    fn zero_instant_is_encodable() {
        let ty = time();
        let bytes = encode_binary(&Value::Time(Timestamp::ZERO), &ty).unwrap();
        assert_eq!(decode_binary(&bytes, &ty).unwrap(), Value::Time(Timestamp::ZERO));
    }

    #[test]
    fn out_of_range_value_is_contract_error_on_encode() {
        let err = encode_binary(&Value::Uint(300), &int(IntType::U8)).unwrap_err();
        assert!(err.is_contract());
    }
}
