//! Value verification and coercion against a field's declared type.
//!
//! Every value stored in a [`Message`](crate::runtime::Message) passes
//! through [`verify_value`], so the encoder can rely on each field holding
//! the canonical variant for its type.

use std::sync::Arc;

use crate::error::ValueError;
use crate::reflect::{FieldData, FieldType, NodeId, Schema};
use crate::runtime::MessageType;
use crate::types::ScalarType;
use crate::value::ProtoValue;

/// Verify `value` for the field `field_id`.
///
/// Null is accepted only for non-required fields; for repeated fields it
/// becomes the empty list. A repeated field wraps a single value into a
/// list and verifies each element. With `skip_repeated` the value is
/// checked as a single element.
pub fn verify_value(
    schema: &Arc<Schema>,
    field_id: NodeId,
    value: ProtoValue,
    skip_repeated: bool,
) -> Result<ProtoValue, ValueError> {
    let name = schema.fqn(field_id);
    let field = schema.field(field_id).ok_or_else(|| ValueError::UnknownField {
        message: schema.fqn(schema.node(field_id).parent().unwrap_or(NodeId::ROOT)),
        field: name.clone(),
    })?;

    if value.is_null() && !skip_repeated {
        if field.is_required() {
            return Err(ValueError::RequiredNull { field: name });
        }
        if field.is_repeated() {
            return Ok(ProtoValue::List(Vec::new()));
        }
        return Ok(ProtoValue::Null);
    }

    if field.is_repeated() && !skip_repeated {
        let items = match value {
            ProtoValue::List(items) => items,
            single => vec![single],
        };
        return items
            .into_iter()
            .map(|item| verify_element(schema, field, &name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(ProtoValue::List);
    }

    if !field.is_repeated() {
        if let ProtoValue::List(_) = value {
            return Err(ValueError::NotRepeated { field: name });
        }
    }
    verify_element(schema, field, &name, value)
}

fn verify_element(
    schema: &Arc<Schema>,
    field: &FieldData,
    name: &str,
    value: ProtoValue,
) -> Result<ProtoValue, ValueError> {
    match &field.field_type {
        FieldType::Scalar(scalar) => coerce_scalar(name, *scalar, value),
        FieldType::Enum(enum_id) => coerce_enum(schema, *enum_id, name, value),
        FieldType::Message(msg_id) => {
            let ty = MessageType::new(schema.clone(), *msg_id);
            match value {
                ProtoValue::Message(m) if m.message_type() == &ty => Ok(ProtoValue::Message(m)),
                obj @ ProtoValue::Object(_) => ty.from_value(obj).map(ProtoValue::Message),
                other => Err(mismatch(name, &ty.full_name(), &other)),
            }
        }
        FieldType::Unresolved(type_name) => Err(ValueError::TypeMismatch {
            field: name.to_string(),
            expected: format!("resolved type '{}'", type_name),
            actual: value.type_name().into(),
        }),
    }
}

fn mismatch(field: &str, expected: &str, actual: &ProtoValue) -> ValueError {
    ValueError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

/// Integral value of a number or numeric string.
fn integral(field: &str, expected: ScalarType, value: &ProtoValue) -> Result<i128, ValueError> {
    let from_float = |f: f64| -> Result<i128, ValueError> {
        if f.is_finite() && f.fract() == 0.0 {
            Ok(f as i128)
        } else {
            Err(ValueError::OutOfRange {
                field: field.to_string(),
                value: f.to_string(),
                expected: expected.keyword().to_string(),
            })
        }
    };
    match value {
        ProtoValue::Int32(v) => Ok(*v as i128),
        ProtoValue::UInt32(v) => Ok(*v as i128),
        ProtoValue::Int64(v) => Ok(*v as i128),
        ProtoValue::UInt64(v) => Ok(*v as i128),
        ProtoValue::Float(v) => from_float(*v as f64),
        ProtoValue::Double(v) => from_float(*v),
        ProtoValue::Str(s) => {
            let s = s.trim();
            match s.parse::<i128>() {
                Ok(n) => Ok(n),
                Err(_) => match s.parse::<f64>() {
                    Ok(f) => from_float(f),
                    Err(_) => Err(mismatch(field, expected.keyword(), value)),
                },
            }
        }
        other => Err(mismatch(field, expected.keyword(), other)),
    }
}

fn in_range<T: TryFrom<i128>>(field: &str, expected: ScalarType, n: i128) -> Result<T, ValueError> {
    T::try_from(n).map_err(|_| ValueError::OutOfRange {
        field: field.to_string(),
        value: n.to_string(),
        expected: expected.keyword().to_string(),
    })
}

/// Coerce a value to the canonical variant of a scalar type.
pub fn coerce_scalar(
    field: &str,
    scalar: ScalarType,
    value: ProtoValue,
) -> Result<ProtoValue, ValueError> {
    match scalar {
        ScalarType::Int32 | ScalarType::SInt32 | ScalarType::SFixed32 => {
            let n = integral(field, scalar, &value)?;
            Ok(ProtoValue::Int32(in_range(field, scalar, n)?))
        }
        ScalarType::UInt32 | ScalarType::Fixed32 => {
            let n = integral(field, scalar, &value)?;
            Ok(ProtoValue::UInt32(in_range(field, scalar, n)?))
        }
        ScalarType::Int64 | ScalarType::SInt64 | ScalarType::SFixed64 => {
            let n = integral(field, scalar, &value)?;
            Ok(ProtoValue::Int64(in_range(field, scalar, n)?))
        }
        ScalarType::UInt64 | ScalarType::Fixed64 => {
            let n = integral(field, scalar, &value)?;
            Ok(ProtoValue::UInt64(in_range(field, scalar, n)?))
        }
        ScalarType::Float | ScalarType::Double => {
            let f = match &value {
                ProtoValue::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| mismatch(field, scalar.keyword(), &value))?,
                other => other
                    .as_f64()
                    .ok_or_else(|| mismatch(field, scalar.keyword(), other))?,
            };
            if scalar == ScalarType::Float {
                Ok(ProtoValue::Float(f as f32))
            } else {
                Ok(ProtoValue::Double(f))
            }
        }
        ScalarType::Bool => match value {
            ProtoValue::Bool(b) => Ok(ProtoValue::Bool(b)),
            ProtoValue::Str(s) => Ok(ProtoValue::Bool(s == "true")),
            other => match other.as_f64() {
                Some(f) => Ok(ProtoValue::Bool(f != 0.0)),
                None => Err(mismatch(field, "bool", &other)),
            },
        },
        ScalarType::String => match value {
            ProtoValue::Str(s) => Ok(ProtoValue::Str(s)),
            other @ (ProtoValue::Bool(_)
            | ProtoValue::Int32(_)
            | ProtoValue::UInt32(_)
            | ProtoValue::Int64(_)
            | ProtoValue::UInt64(_)
            | ProtoValue::Float(_)
            | ProtoValue::Double(_)) => Ok(ProtoValue::Str(other.to_string())),
            other => Err(mismatch(field, "string", &other)),
        },
        ScalarType::Bytes => match value {
            ProtoValue::Bytes(b) => Ok(ProtoValue::Bytes(b)),
            ProtoValue::Str(s) => Ok(ProtoValue::Bytes(s.into_bytes())),
            other => Err(mismatch(field, "bytes", &other)),
        },
    }
}

/// Coerce an enum value given by name or id to its numeric id.
pub fn coerce_enum(
    schema: &Schema,
    enum_id: NodeId,
    field: &str,
    value: ProtoValue,
) -> Result<ProtoValue, ValueError> {
    let invalid = |value: &ProtoValue| ValueError::InvalidEnumValue {
        field: field.to_string(),
        value: value.to_string(),
    };
    let wanted: i64 = match &value {
        ProtoValue::Str(s) => {
            if let Some((_, id)) = schema
                .enum_values(enum_id)
                .find(|(name, _)| *name == s.as_str())
            {
                return Ok(ProtoValue::Int32(id));
            }
            s.trim().parse::<i64>().map_err(|_| invalid(&value))?
        }
        other => match other.as_i64() {
            Some(n) => n,
            None => match other.as_f64() {
                Some(f) if f.fract() == 0.0 => f as i64,
                _ => return Err(invalid(other)),
            },
        },
    };
    schema
        .enum_values(enum_id)
        .find(|(_, id)| *id as i64 == wanted)
        .map(|(_, id)| ProtoValue::Int32(id))
        .ok_or_else(|| invalid(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(
            coerce_scalar("f", ScalarType::Int32, ProtoValue::Int64(5)).unwrap(),
            ProtoValue::Int32(5)
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::UInt64, ProtoValue::from(" 42 ")).unwrap(),
            ProtoValue::UInt64(42)
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::SInt64, ProtoValue::Double(-3.0)).unwrap(),
            ProtoValue::Int64(-3)
        );
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            coerce_scalar("f", ScalarType::UInt32, ProtoValue::Int32(-1)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce_scalar("f", ScalarType::Int32, ProtoValue::Int64(1 << 40)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce_scalar("f", ScalarType::Int32, ProtoValue::Double(1.5)),
            Err(ValueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(
            coerce_scalar("f", ScalarType::Bool, ProtoValue::from("true")).unwrap(),
            ProtoValue::Bool(true)
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::Bool, ProtoValue::from("yes")).unwrap(),
            ProtoValue::Bool(false)
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::Bool, ProtoValue::Int32(2)).unwrap(),
            ProtoValue::Bool(true)
        );
        assert!(coerce_scalar("f", ScalarType::Bool, ProtoValue::Bytes(vec![])).is_err());
    }

    #[test]
    fn test_string_and_bytes() {
        assert_eq!(
            coerce_scalar("f", ScalarType::String, ProtoValue::Int32(7)).unwrap(),
            ProtoValue::from("7")
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::Bytes, ProtoValue::from("ab")).unwrap(),
            ProtoValue::Bytes(b"ab".to_vec())
        );
        assert!(matches!(
            coerce_scalar("f", ScalarType::String, ProtoValue::Bytes(vec![1])),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_float_from_string() {
        assert_eq!(
            coerce_scalar("f", ScalarType::Double, ProtoValue::from("2.5")).unwrap(),
            ProtoValue::Double(2.5)
        );
        assert_eq!(
            coerce_scalar("f", ScalarType::Float, ProtoValue::Int32(3)).unwrap(),
            ProtoValue::Float(3.0)
        );
    }
}
