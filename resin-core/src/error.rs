/// Error raised by a custom representation hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for descriptor construction, encoding and decoding.
///
/// `Contract` and `UnsafeField` are programmer/schema errors: the type shape
/// itself is wrong and retrying cannot help. The remaining variants describe
/// bad data or a failing hook and are surfaced to the caller of the codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("internal contract violation: {0}")]
    Contract(String),
    #[error("field `{field}` has floating-point type {type_name}; mark it unsafe to allow it")]
    UnsafeField { field: String, type_name: String },
    #[error("representation hook of {type_name} failed: {source}")]
    Hook {
        type_name: String,
        #[source]
        source: HookError,
    },
    #[error("invalid data: {0}")]
    Data(String),
    #[error("concrete type not registered: {0}")]
    Unregistered(String),
    #[error("cbor: {0}")]
    Cbor(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        CodecError::Contract(msg.into())
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        CodecError::Data(msg.into())
    }

    /// Returns true for programmer/schema errors that must never be tolerated.
    pub fn is_contract(&self) -> bool {
        matches!(self, CodecError::Contract(_) | CodecError::UnsafeField { .. })
    }
}
