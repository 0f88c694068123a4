use std::fmt;

use crate::codec::wire::WireType;

/// Smallest legal field id.
pub const ID_MIN: i32 = 1;
/// Largest legal field id (2^29 - 1).
pub const ID_MAX: i32 = 0x1FFF_FFFF;

/// Field cardinality as written in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum FieldRule {
    Required,
    Optional,
    Repeated,
}

impl FieldRule {
    pub fn from_keyword(word: &str) -> Option<FieldRule> {
        match word {
            "required" => Some(FieldRule::Required),
            "optional" => Some(FieldRule::Optional),
            "repeated" => Some(FieldRule::Repeated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRule::Required => "required",
            FieldRule::Optional => "optional",
            FieldRule::Repeated => "repeated",
        }
    }
}

impl fmt::Display for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in scalar field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int32,
    UInt32,
    SInt32,
    Int64,
    UInt64,
    SInt64,
    Fixed32,
    SFixed32,
    Fixed64,
    SFixed64,
    Bool,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarType {
    /// Map a schema keyword to its scalar type.
    pub fn from_keyword(word: &str) -> Option<ScalarType> {
        let ty = match word {
            "int32" => ScalarType::Int32,
            "uint32" => ScalarType::UInt32,
            "sint32" => ScalarType::SInt32,
            "int64" => ScalarType::Int64,
            "uint64" => ScalarType::UInt64,
            "sint64" => ScalarType::SInt64,
            "fixed32" => ScalarType::Fixed32,
            "sfixed32" => ScalarType::SFixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed64" => ScalarType::SFixed64,
            "bool" => ScalarType::Bool,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        };
        Some(ty)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::SInt32 => "sint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::SInt64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::SFixed32 => "sfixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::SFixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// The wire type used for a single value of this type.
    pub fn wire_type(&self) -> WireType {
        match self {
            ScalarType::Int32
            | ScalarType::UInt32
            | ScalarType::SInt32
            | ScalarType::Int64
            | ScalarType::UInt64
            | ScalarType::SInt64
            | ScalarType::Bool => WireType::Varint,
            ScalarType::Fixed32 | ScalarType::SFixed32 | ScalarType::Float => WireType::Fixed32,
            ScalarType::Fixed64 | ScalarType::SFixed64 | ScalarType::Double => WireType::Fixed64,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Returns true if `s` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Returns true if `s` is a dotted type reference, optionally absolute
/// (leading dot), e.g. `Foo`, `pkg.Foo`, `.pkg.Foo`.
pub fn is_type_ref(s: &str) -> bool {
    let s = s.strip_prefix('.').unwrap_or(s);
    !s.is_empty() && s.split('.').all(is_name)
}

/// Returns true if `s` is a dotted package path (`a.b.c`, no leading dot).
pub fn is_package_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_name)
}

/// Convert `snake_case` to `camelCase` (`foo_bar` -> `fooBar`).
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for (i, c) in name.chars().enumerate() {
        if c == '_' && i > 0 {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
