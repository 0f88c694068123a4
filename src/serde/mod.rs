//! Serde integration: convert `#[derive(Serialize, Deserialize)]` types to
//! and from runtime messages.
//!
//! Struct fields are matched to message fields by name. Unit enum variants
//! map to enum values by name when serializing and by numeric id (taken as
//! the variant index) or name when deserializing.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: i32,
//!     email: Option<String>,
//! }
//!
//! let mut builder = protodyn::load_proto(r#"
//!     message Person {
//!         required string name = 1;
//!         required int32 age = 2;
//!         optional string email = 3;
//!     }
//! "#).unwrap();
//! let person_type = builder.message_type("Person").unwrap();
//!
//! let person = Person { name: "Alice".into(), age: 30, email: None };
//! let bytes = protodyn::serde::to_bytes(&person_type, &person).unwrap();
//! let decoded: Person = protodyn::serde::from_bytes(&person_type, &bytes).unwrap();
//! assert_eq!(person, decoded);
//! ```

mod de;
mod error;
mod ser;

pub use error::SerdeError;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::runtime::{Message, MessageType};
use crate::value::ProtoValue;

/// Serialize a value into a `ProtoValue` tree without a schema.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<ProtoValue, SerdeError> {
    ser::ProtoSerializer::serialize(value)
}

/// Deserialize a Rust value from a `ProtoValue` tree.
pub fn from_value<T: DeserializeOwned>(value: &ProtoValue) -> Result<T, SerdeError> {
    de::ProtoDeserializer::deserialize(value)
}

/// Build a message of type `ty` from a serializable value. Every value is
/// verified against its field as if assigned with `Message::set`.
pub fn to_message<T: Serialize + ?Sized>(
    ty: &MessageType,
    value: &T,
) -> Result<Message, SerdeError> {
    Ok(ty.from_value(to_value(value)?)?)
}

/// Read a message into a deserializable type.
pub fn from_message<T: DeserializeOwned>(msg: &Message) -> Result<T, SerdeError> {
    from_value(&msg.to_value())
}

/// Serialize a value straight to wire bytes.
pub fn to_bytes<T: Serialize + ?Sized>(ty: &MessageType, value: &T) -> Result<Vec<u8>, SerdeError> {
    Ok(to_message(ty, value)?.encode()?)
}

/// Decode wire bytes straight into a deserializable type.
pub fn from_bytes<T: DeserializeOwned>(ty: &MessageType, data: &[u8]) -> Result<T, SerdeError> {
    from_message(&ty.decode(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    const SCHEMA: &str = r#"
        enum Kind { SMALL = 0; LARGE = 1; }
        message Item {
            required string name = 1;
            optional Kind kind = 2;
        }
        message Order {
            required uint64 id = 1;
            repeated Item items = 2;
            optional bytes note = 3;
            optional double total = 4;
        }
    "#;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    enum Kind {
        SMALL,
        LARGE,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Item {
        name: String,
        kind: Option<Kind>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Order {
        id: u64,
        items: Vec<Item>,
        total: Option<f64>,
    }

    fn order_type() -> MessageType {
        let mut builder = Builder::new();
        builder.import_proto(SCHEMA, None).unwrap();
        builder.message_type("Order").unwrap()
    }

    #[test]
    fn test_roundtrip_struct() {
        let ty = order_type();
        let order = Order {
            id: 42,
            items: vec![
                Item {
                    name: "a".into(),
                    kind: Some(Kind::LARGE),
                },
                Item {
                    name: "b".into(),
                    kind: None,
                },
            ],
            total: Some(9.5),
        };
        let bytes = to_bytes(&ty, &order).unwrap();
        let decoded: Order = from_bytes(&ty, &bytes).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_enum_stored_as_id() {
        let ty = order_type();
        let msg = to_message(
            &ty,
            &Order {
                id: 1,
                items: vec![Item {
                    name: "x".into(),
                    kind: Some(Kind::LARGE),
                }],
                total: None,
            },
        )
        .unwrap();
        let items = msg.get("items").unwrap().as_list().unwrap();
        assert_eq!(items[0].get("kind"), Some(&ProtoValue::Int32(1)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        #[derive(Serialize)]
        struct Extra {
            id: u64,
            bogus: i32,
        }
        let ty = order_type();
        assert!(matches!(
            to_message(&ty, &Extra { id: 1, bogus: 2 }),
            Err(SerdeError::Value(_))
        ));
    }

    #[test]
    fn test_value_conversion() {
        let value = to_value(&Item {
            name: "n".into(),
            kind: None,
        })
        .unwrap();
        assert_eq!(
            value,
            ProtoValue::from_fields([("name", "n".into()), ("kind", ProtoValue::Null)])
        );
        let back: Item = from_value(&value).unwrap();
        assert_eq!(back.name, "n");
        assert_eq!(back.kind, None);
    }
}
