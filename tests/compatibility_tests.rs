//! Schema evolution: messages written by one schema version and read by
//! another.

use pretty_assertions::assert_eq;
use protodyn::{MessageType, ProtoValue};

const V1: &str = r#"
    enum Status { ACTIVE = 0; BANNED = 1; }
    message User {
        required uint64 id = 1;
        optional string name = 2;
        optional Status status = 3;
    }
"#;

const V2: &str = r#"
    enum Status { ACTIVE = 0; BANNED = 1; DELETED = 2; }
    message Tag { optional string label = 1; }
    message User {
        required uint64 id = 1;
        optional string name = 2;
        optional Status status = 3;
        repeated Tag tags = 4;
        optional fixed64 created = 5;
        optional double score = 6;
        repeated sint32 history = 7 [packed = true];
        optional int32 level = 8 [default = 1];
    }
"#;

fn user(schema: &str) -> MessageType {
    protodyn::load_proto(schema)
        .unwrap()
        .message_type("User")
        .unwrap()
}

#[test]
fn test_new_writer_old_reader() {
    let v2 = user(V2);
    let mut msg = v2.new_message();
    msg.set("id", 7u64).unwrap();
    msg.set("name", "ada").unwrap();
    msg.add("tags", ProtoValue::from_fields([("label", "x".into())]))
        .unwrap();
    msg.set("created", 1_700_000_000u64).unwrap();
    msg.set("score", 0.75).unwrap();
    msg.set("history", vec![ProtoValue::from(-1), 2.into()])
        .unwrap();
    let bytes = msg.encode().unwrap();

    let old = user(V1).decode(&bytes).unwrap();
    assert_eq!(
        old.to_value(),
        ProtoValue::from_fields([("id", 7u64.into()), ("name", "ada".into())])
    );
}

#[test]
fn test_old_writer_new_reader() {
    let v1 = user(V1);
    let msg = v1
        .from_fields([("id", 1u64.into()), ("status", "BANNED".into())])
        .unwrap();
    let bytes = msg.encode().unwrap();

    let new = user(V2).decode(&bytes).unwrap();
    assert_eq!(new.get("status").unwrap(), &ProtoValue::Int32(1));
    assert_eq!(new.get("tags").unwrap(), &ProtoValue::List(Vec::new()));
    assert_eq!(new.get("created").unwrap(), &ProtoValue::Null);
    // absent fields fall back to their declared default
    assert_eq!(new.get("level").unwrap(), &ProtoValue::Int32(1));
}

#[test]
fn test_unknown_enum_value_passes_through() {
    let v2 = user(V2);
    let msg = v2
        .from_fields([("id", 2u64.into()), ("status", "DELETED".into())])
        .unwrap();
    let old = user(V1).decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(old.get("status").unwrap(), &ProtoValue::Int32(2));
}
