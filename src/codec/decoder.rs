use std::sync::Arc;

use tracing::trace;

use crate::error::DecodeError;
use crate::reflect::{FieldData, FieldType, Schema};
use crate::runtime::{Message, MessageType};
use crate::types::ScalarType;
use crate::value::ProtoValue;

use super::wire::*;

/// Decode a message of type `ty` from the Protocol Buffers wire format.
///
/// Fields with ids unknown to `ty` are skipped. Repeated packable fields
/// accept both packed and unpacked input. If a required field is still
/// null once the buffer is consumed, the error carries the partially
/// decoded message.
pub fn decode(ty: &MessageType, buf: &[u8]) -> Result<Message, DecodeError> {
    decode_nested(ty, buf, 0)
}

fn decode_nested(ty: &MessageType, buf: &[u8], depth: usize) -> Result<Message, DecodeError> {
    if depth > RECURSION_LIMIT {
        return Err(DecodeError::RecursionLimit {
            limit: RECURSION_LIMIT,
        });
    }
    let schema = ty.schema();
    let mut msg = ty.new_message();
    let mut reader = Reader::new(buf);

    while reader.remaining() > 0 {
        let offset = reader.position();
        let (id, wire_type) = reader.read_key()?;
        if matches!(wire_type, WireType::StartGroup | WireType::EndGroup) {
            return Err(DecodeError::UnsupportedWireType {
                wire_type: wire_type.as_u32(),
                offset,
            });
        }

        let known = ty.field_index_by_id(id).and_then(|index| {
            let field_id = ty.field_ids()[index];
            let field = schema.field(field_id)?;
            let expected = field.field_type.wire_type()?;
            Some((index, field_id, field, expected))
        });
        let Some((index, field_id, field, expected)) = known else {
            trace!(
                "Skipping unknown field {} (wire type {}) in {}",
                id,
                wire_type.as_u32(),
                ty
            );
            reader.skip(wire_type)?;
            continue;
        };
        let name = schema.fqn(field_id);

        if field.is_repeated()
            && field.field_type.is_packable()
            && wire_type == WireType::LengthDelimited
        {
            let body = reader.read_bytes()?;
            let mut packed = Reader::new(body);
            let mut items = Vec::new();
            while packed.remaining() > 0 {
                items.push(read_value(schema, field, &name, &mut packed, depth)?);
            }
            msg.extend_raw(index, items);
            continue;
        }

        if wire_type != expected {
            return Err(DecodeError::WireTypeMismatch {
                field: name,
                expected: expected.as_u32(),
                actual: wire_type.as_u32(),
            });
        }
        let value = read_value(schema, field, &name, &mut reader, depth)?;
        msg.put_raw(index, value, field.is_repeated());
    }

    let missing = ty
        .field_ids()
        .iter()
        .zip(msg.values())
        .find(|(&id, value)| {
            value.is_null() && schema.field(id).is_some_and(FieldData::is_required)
        })
        .map(|(&id, _)| schema.fqn(id));
    match missing {
        Some(field) => Err(DecodeError::MissingRequired {
            field,
            decoded: Box::new(msg),
        }),
        None => Ok(msg),
    }
}

/// Read a single value (no key) of the field's type.
fn read_value(
    schema: &Arc<Schema>,
    field: &FieldData,
    name: &str,
    reader: &mut Reader<'_>,
    depth: usize,
) -> Result<ProtoValue, DecodeError> {
    let value = match &field.field_type {
        FieldType::Scalar(scalar) => match scalar {
            ScalarType::Int32 => ProtoValue::Int32(reader.read_varint()? as i32),
            ScalarType::UInt32 => ProtoValue::UInt32(reader.read_varint()? as u32),
            ScalarType::SInt32 => ProtoValue::Int32(zigzag_decode32(reader.read_varint()? as u32)),
            ScalarType::Fixed32 => ProtoValue::UInt32(reader.read_fixed32()?),
            ScalarType::SFixed32 => ProtoValue::Int32(reader.read_fixed32()? as i32),
            ScalarType::Int64 => ProtoValue::Int64(reader.read_varint()? as i64),
            ScalarType::UInt64 => ProtoValue::UInt64(reader.read_varint()?),
            ScalarType::SInt64 => ProtoValue::Int64(zigzag_decode64(reader.read_varint()?)),
            ScalarType::Fixed64 => ProtoValue::UInt64(reader.read_fixed64()?),
            ScalarType::SFixed64 => ProtoValue::Int64(reader.read_fixed64()? as i64),
            ScalarType::Bool => ProtoValue::Bool(reader.read_varint()? != 0),
            ScalarType::Float => ProtoValue::Float(f32::from_bits(reader.read_fixed32()?)),
            ScalarType::Double => ProtoValue::Double(f64::from_bits(reader.read_fixed64()?)),
            ScalarType::String => {
                let bytes = reader.read_bytes()?.to_vec();
                let s = String::from_utf8(bytes).map_err(|source| DecodeError::InvalidUtf8 {
                    field: name.to_string(),
                    source,
                })?;
                ProtoValue::Str(s)
            }
            ScalarType::Bytes => ProtoValue::Bytes(reader.read_bytes()?.to_vec()),
        },
        // ids missing from the enum pass through unchanged
        FieldType::Enum(_) => ProtoValue::Int32(reader.read_varint()? as i32),
        FieldType::Message(id) => {
            let body = reader.read_bytes()?;
            let nested = MessageType::new(schema.clone(), *id);
            ProtoValue::Message(decode_nested(&nested, body, depth + 1)?)
        }
        FieldType::Unresolved(_) => {
            return Err(DecodeError::WireTypeMismatch {
                field: name.to_string(),
                expected: 0,
                actual: 0,
            })
        }
    };
    Ok(value)
}
