use std::collections::BTreeMap;
use std::fmt;

use crate::runtime::Message;

/// Dynamic value type, used both as input to `Message::set` and as the
/// stored representation of field values.
///
/// Values stored in a message are always canonical for the field's type:
/// `Int32` for int32/sint32/sfixed32 and enums, `UInt32` for uint32/fixed32,
/// `Int64` for int64/sint64/sfixed64, `UInt64` for uint64/fixed64, `Float`,
/// `Double`, `Bool`, `Str`, `Bytes`, `Message`, and `List` for repeated
/// fields. `Null` marks an absent singular field. `Object` only appears as
/// input (a plain key/value record to build a message from) or as the output
/// of `Message::to_value`.
#[derive(Clone, Debug, Default)]
pub enum ProtoValue {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    Message(Message),
    List(Vec<ProtoValue>),
    Object(BTreeMap<String, ProtoValue>),
}

impl ProtoValue {
    /// Helper to build an `Object` from key-value pairs.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, ProtoValue)>,
    {
        ProtoValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ProtoValue::Null)
    }

    /// Get an entry of an `Object`, or a field of a `Message` by name.
    pub fn get(&self, key: &str) -> Option<&ProtoValue> {
        match self {
            ProtoValue::Object(map) => map.get(key),
            ProtoValue::Message(msg) => msg.get(key).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProtoValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer variant widened to i64, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ProtoValue::Int32(v) => Some(*v as i64),
            ProtoValue::UInt32(v) => Some(*v as i64),
            ProtoValue::Int64(v) => Some(*v),
            ProtoValue::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Any integer variant widened to u64, if non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ProtoValue::Int32(v) => u64::try_from(*v).ok(),
            ProtoValue::UInt32(v) => Some(*v as u64),
            ProtoValue::Int64(v) => u64::try_from(*v).ok(),
            ProtoValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Any numeric variant as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ProtoValue::Float(v) => Some(*v as f64),
            ProtoValue::Double(v) => Some(*v),
            ProtoValue::Int32(v) => Some(*v as f64),
            ProtoValue::UInt32(v) => Some(*v as f64),
            ProtoValue::Int64(v) => Some(*v as f64),
            ProtoValue::UInt64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProtoValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ProtoValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            ProtoValue::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ProtoValue]> {
        match self {
            ProtoValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ProtoValue>> {
        match self {
            ProtoValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns a short type description string.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProtoValue::Null => "null",
            ProtoValue::Bool(_) => "bool",
            ProtoValue::Int32(_) => "int32",
            ProtoValue::UInt32(_) => "uint32",
            ProtoValue::Int64(_) => "int64",
            ProtoValue::UInt64(_) => "uint64",
            ProtoValue::Float(_) => "float",
            ProtoValue::Double(_) => "double",
            ProtoValue::Str(_) => "string",
            ProtoValue::Bytes(_) => "bytes",
            ProtoValue::Message(_) => "message",
            ProtoValue::List(_) => "list",
            ProtoValue::Object(_) => "object",
        }
    }
}

impl PartialEq for ProtoValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProtoValue::Null, ProtoValue::Null) => true,
            (ProtoValue::Bool(a), ProtoValue::Bool(b)) => a == b,
            (ProtoValue::Int32(a), ProtoValue::Int32(b)) => a == b,
            (ProtoValue::UInt32(a), ProtoValue::UInt32(b)) => a == b,
            (ProtoValue::Int64(a), ProtoValue::Int64(b)) => a == b,
            (ProtoValue::UInt64(a), ProtoValue::UInt64(b)) => a == b,
            (ProtoValue::Float(a), ProtoValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ProtoValue::Double(a), ProtoValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ProtoValue::Str(a), ProtoValue::Str(b)) => a == b,
            (ProtoValue::Bytes(a), ProtoValue::Bytes(b)) => a == b,
            (ProtoValue::Message(a), ProtoValue::Message(b)) => a == b,
            (ProtoValue::List(a), ProtoValue::List(b)) => a == b,
            (ProtoValue::Object(a), ProtoValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ProtoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoValue::Null => write!(f, "null"),
            ProtoValue::Bool(v) => write!(f, "{}", v),
            ProtoValue::Int32(v) => write!(f, "{}", v),
            ProtoValue::UInt32(v) => write!(f, "{}", v),
            ProtoValue::Int64(v) => write!(f, "{}", v),
            ProtoValue::UInt64(v) => write!(f, "{}", v),
            ProtoValue::Float(v) => write!(f, "{}", v),
            ProtoValue::Double(v) => write!(f, "{}", v),
            ProtoValue::Str(v) => write!(f, "\"{}\"", v),
            ProtoValue::Bytes(v) => write!(f, "<bytes {}>", v.len()),
            ProtoValue::Message(m) => write!(f, "{}", m.to_value()),
            ProtoValue::List(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            ProtoValue::Object(map) => {
                write!(f, "{{ ")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, " }}")
            }
        }
    }
}

// Conversion traits
impl From<bool> for ProtoValue {
    fn from(v: bool) -> Self {
        ProtoValue::Bool(v)
    }
}

impl From<i32> for ProtoValue {
    fn from(v: i32) -> Self {
        ProtoValue::Int32(v)
    }
}

impl From<u32> for ProtoValue {
    fn from(v: u32) -> Self {
        ProtoValue::UInt32(v)
    }
}

impl From<i64> for ProtoValue {
    fn from(v: i64) -> Self {
        ProtoValue::Int64(v)
    }
}

impl From<u64> for ProtoValue {
    fn from(v: u64) -> Self {
        ProtoValue::UInt64(v)
    }
}

impl From<f32> for ProtoValue {
    fn from(v: f32) -> Self {
        ProtoValue::Float(v)
    }
}

impl From<f64> for ProtoValue {
    fn from(v: f64) -> Self {
        ProtoValue::Double(v)
    }
}

impl From<String> for ProtoValue {
    fn from(v: String) -> Self {
        ProtoValue::Str(v)
    }
}

impl From<&str> for ProtoValue {
    fn from(v: &str) -> Self {
        ProtoValue::Str(v.to_string())
    }
}

impl From<Vec<u8>> for ProtoValue {
    fn from(v: Vec<u8>) -> Self {
        ProtoValue::Bytes(v)
    }
}

impl From<Message> for ProtoValue {
    fn from(v: Message) -> Self {
        ProtoValue::Message(v)
    }
}

impl From<Vec<ProtoValue>> for ProtoValue {
    fn from(v: Vec<ProtoValue>) -> Self {
        ProtoValue::List(v)
    }
}

impl From<BTreeMap<String, ProtoValue>> for ProtoValue {
    fn from(v: BTreeMap<String, ProtoValue>) -> Self {
        ProtoValue::Object(v)
    }
}

impl<T: Into<ProtoValue>> From<Option<T>> for ProtoValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ProtoValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        assert_eq!(ProtoValue::from(42i32), ProtoValue::Int32(42));
        assert_eq!(ProtoValue::from(true), ProtoValue::Bool(true));
        assert_eq!(ProtoValue::from("hello"), ProtoValue::Str("hello".into()));
        assert_eq!(ProtoValue::from(None::<i32>), ProtoValue::Null);
    }

    #[test]
    fn test_object_builder() {
        let val = ProtoValue::from_fields([("x", 1i32.into()), ("y", 2i32.into())]);
        assert_eq!(val.get("x"), Some(&ProtoValue::Int32(1)));
        assert_eq!(val.get("z"), None);
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(ProtoValue::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(ProtoValue::Int32(-1).as_u64(), None);
        assert_eq!(ProtoValue::Int32(-1).as_i64(), Some(-1));
        assert_eq!(ProtoValue::Float(0.5).as_f64(), Some(0.5));
    }

    #[test]
    fn test_equality_is_variant_strict() {
        assert_ne!(ProtoValue::Int32(1), ProtoValue::Int64(1));
        assert_eq!(ProtoValue::Double(0.1), ProtoValue::Double(0.1));
    }
}
