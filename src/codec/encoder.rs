use crate::error::{EncodeError, ValueError};
use crate::reflect::{FieldData, FieldType};
use crate::runtime::Message;
use crate::types::ScalarType;
use crate::value::ProtoValue;

use super::wire::*;

/// Why encoding stopped. Kept separate from `EncodeError` so the partial
/// buffer attached to the public error is always the outermost one.
enum Failure {
    Missing(String),
    TooDeep,
    Value(ValueError),
}

impl From<ValueError> for Failure {
    fn from(e: ValueError) -> Self {
        Failure::Value(e)
    }
}

/// Encode a message to the Protocol Buffers wire format.
///
/// Null fields and empty repeated fields are omitted. A required field
/// holding null fails with `EncodeError::MissingRequired`, which carries
/// the bytes written up to that point.
pub fn encode(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match write_message(msg, &mut buf, 0) {
        Ok(()) => Ok(buf),
        Err(Failure::Missing(field)) => Err(EncodeError::MissingRequired {
            field,
            encoded: buf,
        }),
        Err(Failure::TooDeep) => Err(EncodeError::RecursionLimit {
            limit: RECURSION_LIMIT,
        }),
        Err(Failure::Value(e)) => Err(EncodeError::Value(e)),
    }
}

fn write_message(msg: &Message, buf: &mut Vec<u8>, depth: usize) -> Result<(), Failure> {
    if depth > RECURSION_LIMIT {
        return Err(Failure::TooDeep);
    }
    let ty = msg.message_type();
    let schema = ty.schema();
    for (&field_id, value) in ty.field_ids().iter().zip(msg.values()) {
        let Some(field) = schema.field(field_id) else {
            continue;
        };
        let name = || schema.fqn(field_id);

        if value.is_null() {
            if field.is_required() {
                return Err(Failure::Missing(name()));
            }
            continue;
        }

        if !field.is_repeated() {
            let wire_type = wire_type_of(field, &name)?;
            write_key(buf, field.id, wire_type);
            write_value(field, &name, value, buf, depth)?;
            continue;
        }

        let items = match value {
            ProtoValue::List(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        if items.is_empty() {
            continue;
        }

        if field.encodes_packed() {
            write_key(buf, field.id, WireType::LengthDelimited);
            let start = buf.len();
            // one byte reserved for the length, widened below if needed
            buf.push(0);
            for item in items {
                write_value(field, &name, item, buf, depth)?;
            }
            let len = buf.len() - start - 1;
            let mut prefix = Vec::with_capacity(MAX_VARINT_LEN);
            write_varint(&mut prefix, len as u64);
            if prefix.len() == 1 {
                buf[start] = prefix[0];
            } else {
                buf.splice(start..start + 1, prefix);
            }
        } else {
            let wire_type = wire_type_of(field, &name)?;
            for item in items {
                write_key(buf, field.id, wire_type);
                write_value(field, &name, item, buf, depth)?;
            }
        }
    }
    Ok(())
}

fn wire_type_of(field: &FieldData, name: &dyn Fn() -> String) -> Result<WireType, Failure> {
    field.field_type.wire_type().ok_or_else(|| {
        Failure::Value(ValueError::TypeMismatch {
            field: name(),
            expected: "resolved type".into(),
            actual: "unresolved reference".into(),
        })
    })
}

/// Write a single value without its key.
fn write_value(
    field: &FieldData,
    name: &dyn Fn() -> String,
    value: &ProtoValue,
    buf: &mut Vec<u8>,
    depth: usize,
) -> Result<(), Failure> {
    let mismatch = |expected: &str| {
        Failure::Value(ValueError::TypeMismatch {
            field: name(),
            expected: expected.to_string(),
            actual: value.type_name().to_string(),
        })
    };

    match (&field.field_type, value) {
        (FieldType::Scalar(scalar), value) => match (scalar, value) {
            // negative int32 values are sign-extended to ten bytes
            (ScalarType::Int32, ProtoValue::Int32(v)) => write_varint(buf, *v as i64 as u64),
            (ScalarType::SInt32, ProtoValue::Int32(v)) => {
                write_varint(buf, zigzag_encode32(*v) as u64)
            }
            (ScalarType::SFixed32, ProtoValue::Int32(v)) => write_fixed32(buf, *v as u32),
            (ScalarType::UInt32, ProtoValue::UInt32(v)) => write_varint(buf, *v as u64),
            (ScalarType::Fixed32, ProtoValue::UInt32(v)) => write_fixed32(buf, *v),
            (ScalarType::Int64, ProtoValue::Int64(v)) => write_varint(buf, *v as u64),
            (ScalarType::SInt64, ProtoValue::Int64(v)) => write_varint(buf, zigzag_encode64(*v)),
            (ScalarType::SFixed64, ProtoValue::Int64(v)) => write_fixed64(buf, *v as u64),
            (ScalarType::UInt64, ProtoValue::UInt64(v)) => write_varint(buf, *v),
            (ScalarType::Fixed64, ProtoValue::UInt64(v)) => write_fixed64(buf, *v),
            (ScalarType::Bool, ProtoValue::Bool(v)) => write_varint(buf, *v as u64),
            (ScalarType::Float, ProtoValue::Float(v)) => write_fixed32(buf, v.to_bits()),
            (ScalarType::Double, ProtoValue::Double(v)) => write_fixed64(buf, v.to_bits()),
            (ScalarType::String, ProtoValue::Str(s)) => {
                write_varint(buf, s.len() as u64);
                buf.extend_from_slice(s.as_bytes());
            }
            (ScalarType::Bytes, ProtoValue::Bytes(b)) => {
                write_varint(buf, b.len() as u64);
                buf.extend_from_slice(b);
            }
            (scalar, _) => return Err(mismatch(scalar.keyword())),
        },
        (FieldType::Enum(_), ProtoValue::Int32(v)) => write_varint(buf, *v as i64 as u64),
        (FieldType::Message(_), ProtoValue::Message(m)) => {
            let mut sub = Vec::new();
            write_message(m, &mut sub, depth + 1)?;
            write_varint(buf, sub.len() as u64);
            buf.extend_from_slice(&sub);
        }
        (FieldType::Enum(_), _) => return Err(mismatch("enum")),
        (FieldType::Message(_), _) => return Err(mismatch("message")),
        (FieldType::Unresolved(type_name), _) => return Err(mismatch(type_name)),
    }
    Ok(())
}
