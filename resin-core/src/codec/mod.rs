//! Reference tree walkers over the codec core.
//!
//! [`binary`] produces canonical CBOR; [`json`] a textual form keyed by
//! field name. Both walk a [`Value`] against its [`TypeDescriptor`] and lean
//! on the core for every policy decision: omission through the default
//! policy, indirection through the resolver, custom shapes through the
//! representation hooks.

pub mod binary;
pub mod json;

use crate::default::is_default;
use crate::descriptor::{Kind, TypeDescriptor};
use crate::error::CodecError;
use crate::indirect::resolve_all;
use crate::key::Digest;
use crate::reflect::Reflect;
use crate::registry::Registry;
use crate::repr::to_representation;
use crate::value::{Value, mismatch};

/// Whether a field holding `value` counts as empty and may be omitted.
///
/// Pointers are resolved all the way down (any nil level is empty), then
/// the representation object is checked. A record is empty when every field
/// is, a fixed array when every element is, each judged against its own
/// descriptor so the answer agrees with [`canonical_default`](crate::canonical_default).
pub(crate) fn is_empty(value: &Value, ty: &TypeDescriptor) -> Result<bool, CodecError> {
    let Some(inner) = resolve_all(value) else {
        return Ok(true);
    };
    let (inner_ty, _) = ty.deref_all();
    let (object, repr_ty) = to_representation(inner, inner_ty)?;
    match (repr_ty.kind(), &*object) {
        (Kind::Record(fields), Value::Record(values)) if fields.len() == values.len() => {
            for (field, value) in fields.iter().zip(values) {
                if !is_empty(value, field.ty())? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Kind::Array { elem, .. }, Value::Sequence(items)) => {
            for item in items {
                if !is_empty(item, elem)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Kind::Record(_) | Kind::Array { .. }, other) => Err(mismatch(repr_ty, other)),
        (_, other) => is_default(other),
    }
}

/// Canonical binary encoding of `value`.
pub fn to_binary<T: Reflect>(value: &T) -> Result<Vec<u8>, CodecError> {
    let ty = Registry::global().descriptor::<T>()?;
    binary::encode_binary(&value.to_value(), &ty)
}

pub fn from_binary<T: Reflect>(bytes: &[u8]) -> Result<T, CodecError> {
    let ty = Registry::global().descriptor::<T>()?;
    T::from_value(binary::decode_binary(bytes, &ty)?)
}

pub fn to_json<T: Reflect>(value: &T) -> Result<String, CodecError> {
    let ty = Registry::global().descriptor::<T>()?;
    json::encode_json(&value.to_value(), &ty)
}

pub fn from_json<T: Reflect>(text: &str) -> Result<T, CodecError> {
    let ty = Registry::global().descriptor::<T>()?;
    T::from_value(json::decode_json(text, &ty)?)
}

/// Digest of the canonical binary encoding.
pub fn digest<T: Reflect>(value: &T) -> Result<Digest, CodecError> {
    Ok(Digest::from_data(&to_binary(value)?))
}
