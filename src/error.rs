use crate::runtime::Message;

/// Errors from the schema tokenizer and parser.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("lexical error at line {line}: {message}")]
    Lexical { line: usize, message: String },

    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lexical { line, .. } | ParseError::Syntax { line, .. } => *line,
        }
    }
}

/// Errors raised while materializing definitions into the reflection tree.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid {kind} definition '{name}': {reason}")]
    InvalidDefinition {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("duplicate name in namespace '{namespace}': {name}")]
    DuplicateName { namespace: String, name: String },

    #[error("duplicate id {id} in '{scope}'")]
    DuplicateId { scope: String, id: i32 },

    #[error("extended field '{field}' id {id} is outside the extension range of '{message}'")]
    ExtensionRange {
        message: String,
        field: String,
        id: i32,
    },

    #[error("extended message '{0}' is not defined")]
    UndefinedExtendTarget(String),

    #[error("illegal package name '{0}'")]
    IllegalPackage(String),

    #[error("no such path '{0}' in the built namespace")]
    UnknownPath(String),

    #[error("failed to read import '{path}': {source}")]
    Import {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("in import '{path}': {source}")]
    ImportParse {
        path: std::path::PathBuf,
        #[source]
        source: ParseError,
    },

    #[cfg(feature = "serde")]
    #[error("invalid JSON schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errors from `Builder::resolve_all`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unresolvable type reference '{type_name}' in '{referenced_by}'")]
    UnresolvableType {
        type_name: String,
        referenced_by: String,
    },

    #[error("'{type_name}' referenced by '{referenced_by}' is not a message")]
    NotAMessage {
        type_name: String,
        referenced_by: String,
    },

    #[error("illegal default value for '{field}': {source}")]
    InvalidDefault {
        field: String,
        #[source]
        source: ValueError,
    },
}

/// Errors raised when a value does not fit a field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("'{message}' has no field named '{field}'")]
    UnknownField { message: String, field: String },

    #[error("illegal value for '{field}': null for a required field")]
    RequiredNull { field: String },

    #[error("illegal value for '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("illegal value for '{field}': {value} is out of range for {expected}")]
    OutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    #[error("illegal value for '{field}': {value} is not a valid enum value")]
    InvalidEnumValue { field: String, value: String },

    #[error("illegal value for '{field}': '{field}' is not a repeated field")]
    NotRepeated { field: String },

    #[error("illegal default for '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },
}

/// Errors from the wire encoder.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A required field held null. `encoded` holds the bytes written before
    /// the failure.
    #[error("missing required field '{field}'")]
    MissingRequired { field: String, encoded: Vec<u8> },

    #[error("message nesting exceeds {limit} levels")]
    RecursionLimit { limit: usize },

    #[error(transparent)]
    Value(#[from] ValueError),
}

impl EncodeError {
    /// The partially encoded buffer, if this error carries one.
    pub fn encoded(&self) -> Option<&[u8]> {
        match self {
            EncodeError::MissingRequired { encoded, .. } => Some(encoded),
            _ => None,
        }
    }
}

/// Errors from the wire decoder.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated data: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("malformed varint at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType { wire_type: u32, offset: usize },

    #[error("unsupported wire type {wire_type} (groups) at offset {offset}")]
    UnsupportedWireType { wire_type: u32, offset: usize },

    #[error("illegal wire type {actual} for field '{field}', expected {expected}")]
    WireTypeMismatch {
        field: String,
        expected: u32,
        actual: u32,
    },

    #[error("illegal field id at offset {offset}")]
    InvalidFieldId { offset: usize },

    #[error("message nesting exceeds {limit} levels")]
    RecursionLimit { limit: usize },

    #[error("invalid utf-8 string in field '{field}': {source}")]
    InvalidUtf8 {
        field: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// A required field was absent. `decoded` holds what was read.
    #[error("missing required field '{field}'")]
    MissingRequired {
        field: String,
        decoded: Box<Message>,
    },

    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base64 input: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl DecodeError {
    /// The partially decoded message, if this error carries one.
    pub fn decoded(&self) -> Option<&Message> {
        match self {
            DecodeError::MissingRequired { decoded, .. } => Some(decoded),
            _ => None,
        }
    }
}

/// Top-level error type that wraps all sub-errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Result type alias for protodyn operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
