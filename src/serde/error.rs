//! Errors of the serde bridge.

use std::fmt::Display;

use crate::error::{DecodeError, EncodeError, ValueError};

/// Error type for converting between serde types and messages.
#[derive(Debug, thiserror::Error)]
pub enum SerdeError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}
