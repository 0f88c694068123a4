//! Encode then decode through the public API.

use pretty_assertions::assert_eq;
use protodyn::error::ValueError;
use protodyn::{Builder, ProtoValue};

const GEOMETRY: &str = r#"
    package geo;

    message Point {
        required int32 x = 1;
        required int32 y = 2;
    }

    message Path {
        repeated Point points = 1;
        optional string label = 2;
    }
"#;

#[test]
fn test_path_of_points() {
    let mut builder = protodyn::load_proto(GEOMETRY).unwrap();
    let root = builder.build(None).unwrap();
    let point = root.message_type("geo.Point").unwrap();
    let path = root.message_type("geo.Path").unwrap();

    let mut msg = path.new_message();
    msg.add("points", point.from_fields([("x", 1.into()), ("y", 2.into())]).unwrap())
        .unwrap();
    msg.add(
        "points",
        ProtoValue::from_fields([("x", (-3).into()), ("y", 4.into())]),
    )
    .unwrap();
    msg.set("label", "zigzag").unwrap();

    let bytes = msg.encode().unwrap();
    let decoded = path.decode(&bytes).unwrap();
    assert_eq!(decoded, msg);

    let points = decoded.get("points").unwrap().as_list().unwrap();
    assert_eq!(points.len(), 2);
    let second = points[1].as_message().unwrap();
    assert_eq!(second.message_type(), &point);
    assert_eq!(second.get("x").unwrap(), &ProtoValue::Int32(-3));
}

#[test]
fn test_to_value() {
    let mut builder = protodyn::load_proto(GEOMETRY).unwrap();
    let path = builder.message_type("geo.Path").unwrap();
    let msg = path
        .from_fields([(
            "points",
            ProtoValue::List(vec![ProtoValue::from_fields([
                ("x", 5.into()),
                ("y", 6.into()),
            ])]),
        )])
        .unwrap();

    assert_eq!(
        msg.to_value(),
        ProtoValue::from_fields([(
            "points",
            ProtoValue::List(vec![ProtoValue::from_fields([
                ("x", 5.into()),
                ("y", 6.into()),
            ])]),
        )])
    );
}

#[test]
fn test_construct_forms() {
    let mut builder = protodyn::load_proto(GEOMETRY).unwrap();
    let point = builder.message_type("geo.Point").unwrap();

    let empty = point.construct(vec![]).unwrap();
    assert_eq!(empty.get("x").unwrap(), &ProtoValue::Null);

    let by_key = point
        .construct(vec![ProtoValue::from_fields([
            ("x", 1.into()),
            ("y", 2.into()),
        ])])
        .unwrap();
    let positional = point.construct(vec![1.into(), 2.into()]).unwrap();
    assert_eq!(by_key, positional);

    assert!(matches!(
        point.construct(vec![1.into(), 2.into(), 3.into()]),
        Err(ValueError::UnknownField { .. })
    ));
}

#[test]
fn test_scalar_extremes() {
    let mut builder = Builder::new();
    builder
        .import_proto(
            r#"
            message Extremes {
                optional int32 i32 = 1;
                optional int64 i64 = 2;
                optional uint32 u32 = 3;
                optional uint64 u64 = 4;
                optional sint32 s32 = 5;
                optional sint64 s64 = 6;
                optional fixed32 f32 = 7;
                optional fixed64 f64 = 8;
                optional sfixed32 sf32 = 9;
                optional sfixed64 sf64 = 10;
                optional float flt = 11;
                optional double dbl = 12;
                optional bool flag = 13;
                optional string text = 14;
                optional bytes raw = 15;
            }
            "#,
            None,
        )
        .unwrap();
    let ty = builder.message_type("Extremes").unwrap();
    let msg = ty
        .from_fields([
            ("i32", i32::MIN.into()),
            ("i64", i64::MIN.into()),
            ("u32", u32::MAX.into()),
            ("u64", u64::MAX.into()),
            ("s32", i32::MIN.into()),
            ("s64", i64::MAX.into()),
            ("f32", u32::MAX.into()),
            ("f64", u64::MAX.into()),
            ("sf32", (-1).into()),
            ("sf64", i64::MIN.into()),
            ("flt", 1.5f32.into()),
            ("dbl", (-0.25).into()),
            ("flag", false.into()),
            ("text", "héllo".into()),
            ("raw", vec![0u8, 255].into()),
        ])
        .unwrap();
    let decoded = ty.decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_text_encodings() {
    let mut builder = protodyn::load_proto(GEOMETRY).unwrap();
    let point = builder.message_type("geo.Point").unwrap();
    let msg = point.construct(vec![300.into(), (-300).into()]).unwrap();

    assert_eq!(point.decode_hex(&msg.encode_hex().unwrap()).unwrap(), msg);
    assert_eq!(
        point.decode_base64(&msg.encode_base64().unwrap()).unwrap(),
        msg
    );
}

#[test]
fn test_delimited_stream() {
    let mut builder = protodyn::load_proto(GEOMETRY).unwrap();
    let point = builder.message_type("geo.Point").unwrap();

    let mut stream = Vec::new();
    for i in 0..3 {
        let msg = point.construct(vec![i.into(), (i * 10).into()]).unwrap();
        stream.extend(msg.encode_delimited().unwrap());
    }

    let mut rest = stream.as_slice();
    let mut xs = Vec::new();
    while !rest.is_empty() {
        let (msg, consumed) = point.decode_delimited(rest).unwrap();
        xs.push(msg.get("x").unwrap().clone());
        rest = &rest[consumed..];
    }
    assert_eq!(xs, vec![ProtoValue::Int32(0), 1.into(), 2.into()]);
}
