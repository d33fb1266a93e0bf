#![forbid(unsafe_code)]
//! Streaming JSON encoding of tensors as nested objects.
//!
//! A tensor over dimensions `[D1, .., Dn]` is written as an object keyed by `D1` coordinates
//! whose values are objects keyed by `D2` coordinates, and so on down to the values. The
//! reader walks the same structure token by token and fills a tensor builder directly.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;
use tn_core::{DimensionType, TensorError};
use tn_nest::NestError;

mod adapter;
mod codec;
mod config;
mod key;
mod registry;

pub use adapter::{AdapterFactory, ErasedAdapter, TensorbackedAdapter};
pub use codec::{TensorCodec, TensorDocument, TensorSeed};
pub use config::{CodecConfig, DEFAULT_MAX_PAYLOAD_BYTES, DuplicatePolicy};
pub use key::{EncodedKey, KeyCodec, KeyDeserializer, KeyError, KeySerializer, SerdeKeyCodec};
pub use registry::CodecRegistry;

/// The kind of JSON token at a read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    BeginObject,
    BeginArray,
    String,
    Number,
    Boolean,
    Null,
}

impl TokenKind {
    #[must_use]
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(_) => Self::BeginObject,
            serde_json::Value::Array(_) => Self::BeginArray,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Null => Self::Null,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeginObject => "BEGIN_OBJECT",
            Self::BeginArray => "BEGIN_ARRAY",
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::Null => "NULL",
        }
    }

    /// Maps serde's `Unexpected`/`Expected` wording onto token kinds.
    fn from_serde_wording(wording: &str) -> Option<Self> {
        let wording = wording.trim();
        let wording = wording
            .strip_prefix("an ")
            .or_else(|| wording.strip_prefix("a "))
            .unwrap_or(wording);
        let head = wording.split([' ', '`']).next().unwrap_or(wording);
        let kind = match head {
            "map" | "struct" => Self::BeginObject,
            "sequence" | "tuple" | "array" => Self::BeginArray,
            "string" | "char" => Self::String,
            "floating" | "integer" | "number" | "f32" | "f64" | "i8" | "i16" | "i32" | "i64"
            | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "null" | "unit" => Self::Null,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed input at line {line} column {column}: expected {expected} but was {found}")]
    MalformedInput {
        expected: TokenKind,
        found: TokenKind,
        line: usize,
        column: usize,
    },
    #[error("malformed input at line {line} column {column}: cannot read {target}: {reason}")]
    UndecodableToken {
        target: &'static str,
        reason: String,
        line: usize,
        column: usize,
    },
    #[error("duplicate coordinate {position} at line {line} column {column}")]
    DuplicateCoordinate {
        position: String,
        line: usize,
        column: usize,
    },
    #[error("no key codec registered for dimension {dimension}")]
    UnregisteredDimension { dimension: DimensionType },
    #[error("payload exceeds max bytes: actual={actual} max={max}")]
    PayloadTooLarge { actual: usize, max: usize },
    #[error("value is not a {expected}")]
    TypeMismatch { expected: &'static str },
    #[error(transparent)]
    Nest(#[from] NestError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True for input that does not have the nested shape or tokens the codec expects.
    #[must_use]
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput { .. } | Self::UndecodableToken { .. }
        )
    }
}

fn validate_payload_size(actual: usize, max: usize) -> Result<(), CodecError> {
    if actual > max {
        return Err(CodecError::PayloadTooLarge { actual, max });
    }
    Ok(())
}
