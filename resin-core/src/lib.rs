//! Resin is the core of a deterministic serialization codec.
//!
//! Core concepts:
//! - **TypeDescriptor**: immutable metadata for one static type, cached per type in a [`Registry`]
//! - **Value**: a runtime instance walked against its descriptor
//! - **Safety gate**: rejects floating-point fields unless marked unsafe
//! - **Default policy**: what is "empty" on encode and what an absent field becomes on decode
//! - **Indirection resolver**: pointer stripping and on-demand allocation of decode targets
//! - **Representation hooks**: types whose canonical shape differs from their natural one
//!
//! # Example
//!
//! ```
//! use resin_core::{Reflect, Timestamp, from_binary, to_binary};
//!
//! #[derive(Debug, PartialEq, Reflect)]
//! struct Payment {
//!     timestamp: Option<Timestamp>,
//!     #[resin(unsafe)]
//!     amount: f64,
//!     note: String,
//! }
//!
//! let empty = Payment { timestamp: None, amount: 0.0, note: String::new() };
//! let bytes = to_binary(&empty).unwrap();
//! // Every field is empty, so the record is an empty map.
//! assert_eq!(bytes, vec![0xa0]);
//!
//! // An absent time decodes to the reference instant, not to nil.
//! let decoded: Payment = from_binary(&bytes).unwrap();
//! assert_eq!(decoded.timestamp, Some(Timestamp::REFERENCE));
//! ```

pub mod codec;
mod default;
mod descriptor;
mod error;
mod indirect;
mod key;
mod reflect;
mod registry;
mod repr;
mod safety;
mod time;
mod value;

pub use codec::{digest, from_binary, from_json, to_binary, to_json};
pub use default::{canonical_default, is_default, is_default_deep};
pub use descriptor::{
    FieldDescriptor, FloatType, IntType, InterfaceDescriptor, Kind, TypeDescriptor, primitives,
};
pub use error::{CodecError, HookError};
pub use indirect::{
    ConcreteInstance, Resolved, construct_concrete, construct_concrete_nil_preferred,
    construct_pointee, deref_and_construct, is_nilish, resolve, resolve_all,
};
pub use key::{Digest, Prefix};
pub use reflect::{ByteString, Reflect};
pub use registry::Registry;
pub use repr::{
    CustomRepresentation, Representation, RepresentationHook, TypedHook, from_representation,
    to_representation, to_representation_mut,
};
pub use safety::check_safety;
pub use time::Timestamp;
pub use value::{Opaque, Value, Variant};

#[doc(hidden)]
pub use reflect::__private;

#[cfg(feature = "derive")]
pub use resin_derive::Reflect;
