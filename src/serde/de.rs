//! Deserializer reading Rust types out of `ProtoValue` trees.

use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};

use super::error::SerdeError;
use crate::value::ProtoValue;

/// Deserializer over a borrowed `ProtoValue`.
pub struct ProtoDeserializer<'de> {
    value: &'de ProtoValue,
}

impl<'de> ProtoDeserializer<'de> {
    pub fn new(value: &'de ProtoValue) -> Self {
        ProtoDeserializer { value }
    }

    pub fn deserialize<T: de::Deserialize<'de>>(value: &'de ProtoValue) -> Result<T, SerdeError> {
        T::deserialize(ProtoDeserializer::new(value))
    }

    fn mismatch(&self, expected: &str) -> SerdeError {
        SerdeError::TypeMismatch {
            expected: expected.into(),
            actual: self.value.type_name().into(),
        }
    }
}

impl<'de> de::Deserializer<'de> for ProtoDeserializer<'de> {
    type Error = SerdeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Null => visitor.visit_unit(),
            ProtoValue::Bool(v) => visitor.visit_bool(*v),
            ProtoValue::Int32(v) => visitor.visit_i32(*v),
            ProtoValue::UInt32(v) => visitor.visit_u32(*v),
            ProtoValue::Int64(v) => visitor.visit_i64(*v),
            ProtoValue::UInt64(v) => visitor.visit_u64(*v),
            ProtoValue::Float(v) => visitor.visit_f32(*v),
            ProtoValue::Double(v) => visitor.visit_f64(*v),
            ProtoValue::Str(v) => visitor.visit_borrowed_str(v),
            ProtoValue::Bytes(v) => visitor.visit_borrowed_bytes(v),
            ProtoValue::Message(_) => Err(SerdeError::UnsupportedType(
                "message instances must be converted with to_value first".into(),
            )),
            ProtoValue::List(_) => self.deserialize_seq(visitor),
            ProtoValue::Object(_) => self.deserialize_map(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Bool(v) => visitor.visit_bool(*v),
            other => match other.as_i64() {
                Some(n) => visitor.visit_bool(n != 0),
                None => Err(self.mismatch("bool")),
            },
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value.as_i64() {
            Some(v) => visitor.visit_i64(v),
            None => Err(self.mismatch("integer")),
        }
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value.as_u64() {
            Some(v) => visitor.visit_u64(v),
            None => Err(self.mismatch("unsigned integer")),
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value.as_f64() {
            Some(v) => visitor.visit_f64(v),
            None => Err(self.mismatch("number")),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(self.mismatch("single character")),
                }
            }
            _ => Err(self.mismatch("char")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Str(s) => visitor.visit_borrowed_str(s),
            _ => Err(self.mismatch("string")),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Bytes(b) => visitor.visit_borrowed_bytes(b),
            ProtoValue::Str(s) => visitor.visit_borrowed_bytes(s.as_bytes()),
            _ => Err(self.mismatch("bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::List(items) => visitor.visit_seq(SeqAccess {
                iter: items.iter(),
            }),
            _ => Err(self.mismatch("list")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Object(map) => visitor.visit_map(MapAccess {
                iter: map.iter(),
                current_value: None,
            }),
            _ => Err(self.mismatch("object")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    /// Unit variants are read from an enum value name or from a numeric id
    /// used as the variant index.
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Str(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            other => match other.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(index) => visitor.visit_enum(index.into_deserializer()),
                None => Err(self.mismatch("enum name or id")),
            },
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct SeqAccess<'de> {
    iter: std::slice::Iter<'de, ProtoValue>,
}

impl<'de> de::SeqAccess<'de> for SeqAccess<'de> {
    type Error = SerdeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ProtoDeserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAccess<'de> {
    iter: std::collections::btree_map::Iter<'de, String, ProtoValue>,
    current_value: Option<&'de ProtoValue>,
}

impl<'de> de::MapAccess<'de> for MapAccess<'de> {
    type Error = SerdeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.current_value = Some(value);
                seed.deserialize(key.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let value = self.current_value.take().ok_or_else(|| {
            SerdeError::Custom("next_value_seed called before next_key_seed".into())
        })?;
        seed.deserialize(ProtoDeserializer::new(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}
