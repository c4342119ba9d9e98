//! Textual walker over `serde_json`.
//!
//! Records are objects keyed by field name, and only `omit_empty` fields are
//! ever left out. 64-bit integers travel as strings, bytes as base64, time
//! as RFC 3339. An interface is `{"type": name, "value": payload}`, a typed
//! nil `{"type": name}`; `{}` on decode is the tagless form.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Number, Value as JsonValue};

use crate::codec::binary::int_value;
use crate::codec::is_empty;
use crate::default::canonical_default;
use crate::descriptor::{IntType, Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::indirect::{
    construct_concrete, construct_concrete_nil_preferred, construct_pointee, deref_and_construct,
};
use crate::repr::{from_representation, to_representation};
use crate::time::Timestamp;
use crate::value::{Value, mismatch};

const TYPE_KEY: &str = "type";
const VALUE_KEY: &str = "value";

pub fn encode_json(value: &Value, ty: &TypeDescriptor) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&encode_value(value, ty)?)?)
}

pub fn decode_json(text: &str, ty: &TypeDescriptor) -> Result<Value, CodecError> {
    let mut target = Value::zero(ty);
    decode_json_into(text, ty, &mut target)?;
    Ok(target)
}

pub fn decode_json_into(
    text: &str,
    ty: &TypeDescriptor,
    target: &mut Value,
) -> Result<(), CodecError> {
    let tree: JsonValue = serde_json::from_str(text)?;
    decode_value(&tree, ty, target)
}

fn encode_value(value: &Value, ty: &TypeDescriptor) -> Result<JsonValue, CodecError> {
    if ty.representation().is_some() {
        let (object, repr_ty) = to_representation(value, ty)?;
        return encode_value(&object, repr_ty);
    }

    Ok(match (ty.kind(), value) {
        (Kind::Bool, Value::Bool(b)) => JsonValue::Bool(*b),
        (Kind::Int(width), Value::Int(n)) => encode_int(*width, i128::from(*n), ty)?,
        (Kind::Int(width), Value::Uint(n)) => encode_int(*width, i128::from(*n), ty)?,
        (Kind::Float(_), Value::Float(x)) => Number::from_f64(*x)
            .map(JsonValue::Number)
            .ok_or_else(|| CodecError::data(format!("{x} has no JSON form")))?,
        (Kind::Unicode, Value::Unicode(s)) => JsonValue::String(s.clone()),
        (Kind::ByteString, Value::Bytes(b)) => JsonValue::String(STANDARD.encode(b)),
        (Kind::Time, Value::Time(t)) => JsonValue::String(t.to_rfc3339()),
        (Kind::Sequence(elem), Value::Sequence(items))
        | (Kind::Array { elem, .. }, Value::Sequence(items)) => {
            if let Kind::Array { len, .. } = ty.kind() {
                if items.len() != *len {
                    return Err(CodecError::contract(format!(
                        "{} holds {} elements",
                        ty.name(),
                        items.len()
                    )));
                }
            }
            JsonValue::Array(
                items
                    .iter()
                    .map(|item| encode_value(item, elem))
                    .collect::<Result<_, _>>()?,
            )
        }
        (Kind::Record(fields), Value::Record(values)) if fields.len() == values.len() => {
            let mut obj = Map::new();
            for (field, value) in fields.iter().zip(values) {
                if field.omit_empty() && is_empty(value, field.ty())? {
                    continue;
                }
                obj.insert(field.name().to_string(), encode_value(value, field.ty())?);
            }
            JsonValue::Object(obj)
        }
        (Kind::Pointer(inner), Value::Pointer(pointee)) => match pointee {
            None => JsonValue::Null,
            Some(pointee) => encode_value(pointee, inner)?,
        },
        (Kind::Interface(iface), Value::Interface(variant)) => {
            let Some(variant) = variant else {
                return Ok(JsonValue::Null);
            };
            let concrete = iface.variant(&variant.name).ok_or_else(|| {
                CodecError::Unregistered(format!("{} in {}", variant.name, ty.name()))
            })?;
            let mut obj = Map::new();
            obj.insert(TYPE_KEY.to_string(), JsonValue::String(variant.name.clone()));
            let payload = match (&variant.value, concrete.pointer_preferred()) {
                (Value::Pointer(None), true) => None,
                (Value::Pointer(Some(instance)), true) => Some(encode_value(instance, concrete)?),
                (instance, false) => Some(encode_value(instance, concrete)?),
                (other, true) => return Err(mismatch(concrete, other)),
            };
            if let Some(payload) = payload {
                obj.insert(VALUE_KEY.to_string(), payload);
            }
            JsonValue::Object(obj)
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

fn encode_int(width: IntType, n: i128, ty: &TypeDescriptor) -> Result<JsonValue, CodecError> {
    if !width.contains(n) {
        return Err(CodecError::contract(format!("{n} out of range for {}", ty.name())));
    }
    if width.is_wide() {
        return Ok(JsonValue::String(n.to_string()));
    }
    // Narrow widths always fit in i64.
    Ok(JsonValue::Number(Number::from(n as i64)))
}

fn decode_value(
    node: &JsonValue,
    ty: &TypeDescriptor,
    target: &mut Value,
) -> Result<(), CodecError> {
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
            let x = node.as_f64().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Float(x);
            Ok(())
        }
        Kind::Unicode => {
            let s = node.as_str().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Unicode(s.to_string());
            Ok(())
        }
        Kind::ByteString => {
            let s = node.as_str().ok_or_else(|| unexpected(ty, node))?;
            let bytes = STANDARD
                .decode(s)
                .map_err(|e| CodecError::data(format!("{}: bad base64: {e}", ty.name())))?;
            *target = Value::Bytes(bytes);
            Ok(())
        }
        Kind::Time => {
            let s = node.as_str().ok_or_else(|| unexpected(ty, node))?;
            *target = Value::Time(Timestamp::parse_rfc3339(s)?);
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
            let obj = node.as_object().ok_or_else(|| unexpected(ty, node))?;
            let is_known = |key: &str| fields.iter().any(|f| f.name() == key);
            if let Some(unknown) = obj.keys().find(|k| !is_known(k.as_str())) {
                return Err(CodecError::data(format!(
                    "{}: unknown field {unknown:?}",
                    ty.name()
                )));
            }
            if target.as_record().map(<[Value]>::len) != Some(fields.len()) {
                *target = Value::zero(ty);
            }
            let slots = target.as_record_mut().ok_or_else(|| {
                CodecError::contract(format!("{} target is not a record", ty.name()))
            })?;
            for (field, slot) in fields.iter().zip(slots.iter_mut()) {
                match obj.get(field.name()) {
                    Some(node) => decode_value(node, field.ty(), slot)?,
                    None => *slot = canonical_default(field.ty()),
                }
            }
            Ok(())
        }
        Kind::Interface(iface) => {
            if node.is_null() {
                *target = Value::Interface(None);
                return Ok(());
            }
            let obj = node.as_object().ok_or_else(|| unexpected(ty, node))?;
            if let Some(extra) = obj.keys().find(|k| *k != TYPE_KEY && *k != VALUE_KEY) {
                return Err(CodecError::data(format!(
                    "{}: unexpected key {extra:?}",
                    ty.name()
                )));
            }
            let Some(name) = obj.get(TYPE_KEY) else {
                if obj.contains_key(VALUE_KEY) {
                    return Err(CodecError::data(format!(
                        "{}: value without type",
                        ty.name()
                    )));
                }
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

            let name = name.as_str().ok_or_else(|| {
                CodecError::data(format!("{}: type must be a string", ty.name()))
            })?;
            let concrete = iface
                .variant(name)
                .ok_or_else(|| CodecError::Unregistered(format!("{name} in {}", ty.name())))?;
            match obj.get(VALUE_KEY) {
                None if concrete.pointer_preferred() => {
                    *target = Value::interface(concrete.name(), Value::nil());
                    Ok(())
                }
                None => Err(CodecError::data(format!(
                    "typed nil for by-value variant {name}"
                ))),
                Some(payload) => {
                    let mut instance = construct_concrete(concrete);
                    decode_value(payload, concrete, instance.instance_mut())?;
                    *target = instance.into_interface();
                    Ok(())
                }
            }
        }
        Kind::Opaque => Err(CodecError::contract(format!(
            "opaque type {} has no representation",
            ty.name()
        ))),
    }
}

fn decode_elements(items: &[JsonValue], elem: &TypeDescriptor) -> Result<Vec<Value>, CodecError> {
    items
        .iter()
        .map(|item| {
            let mut value = Value::zero(elem);
            decode_value(item, elem, &mut value)?;
            Ok(value)
        })
        .collect()
}

fn decode_int(node: &JsonValue, width: IntType, ty: &TypeDescriptor) -> Result<i128, CodecError> {
    let n = match node {
        JsonValue::String(s) if width.is_wide() => s
            .parse::<i128>()
            .map_err(|e| CodecError::data(format!("{}: bad integer {s:?}: {e}", ty.name())))?,
        JsonValue::Number(n) if !width.is_wide() => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| CodecError::data(format!("{}: {n} is not an integer", ty.name())))?,
        other => return Err(unexpected(ty, other)),
    };
    if !width.contains(n) {
        return Err(CodecError::data(format!("{n} out of range for {}", ty.name())));
    }
    Ok(n)
}

fn unexpected(ty: &TypeDescriptor, node: &JsonValue) -> CodecError {
    let found = match node {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    };
    CodecError::data(format!(
        "expected {} for {}, found {found}",
        ty.kind().label(),
        ty.name()
    ))
}
