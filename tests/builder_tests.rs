//! Builder tests: namespaces, scope resolution, imports and the built tree.

use std::fs;

use pretty_assertions::assert_eq;
use protodyn::error::{BuildError, ProtoError, ResolveError};
use protodyn::{Builder, BuilderOptions, Built, ProtoValue};

fn builder(text: &str) -> Builder {
    protodyn::load_proto(text).unwrap()
}

#[test]
fn test_resolves_nearest_scope_first() {
    let mut b = builder(
        r#"
        message OtherMessage { optional int32 top = 1; }
        message A {
            message B {
                message C { optional OtherMessage other = 1; }
                message OtherMessage { optional int32 inner = 1; }
            }
        }
        "#,
    );
    let c = b.message_type("A.B.C").unwrap();
    let fields = c.fields();
    assert_eq!(fields[0].type_name, ".A.B.OtherMessage");
}

#[test]
fn test_leading_dot_resolves_from_root() {
    let mut b = builder(
        r#"
        message OtherMessage { optional int32 top = 1; }
        message A {
            message B {
                message C { optional .OtherMessage other = 1; }
                message OtherMessage { optional int32 inner = 1; }
            }
        }
        "#,
    );
    let c = b.message_type("A.B.C").unwrap();
    assert_eq!(c.fields()[0].type_name, ".OtherMessage");
}

#[test]
fn test_package_qualified_references() {
    let mut b = builder(
        r#"
        package shop.orders;
        enum State { OPEN = 0; CLOSED = 1; }
        message Line { required string sku = 1; }
        message Order {
            repeated shop.orders.Line lines = 1;
            optional orders.State state = 2;
        }
        "#,
    );
    let order = b.message_type("shop.orders.Order").unwrap();
    let types: Vec<String> = order.fields().into_iter().map(|f| f.type_name).collect();
    assert_eq!(types, vec![".shop.orders.Line", ".shop.orders.State"]);
    assert_eq!(order.full_name(), ".shop.orders.Order");
}

#[test]
fn test_unresolvable_type() {
    let mut b = builder("message M { optional Missing m = 1; }");
    match b.build(None) {
        Err(BuildError::Resolve(ResolveError::UnresolvableType {
            type_name,
            referenced_by,
        })) => {
            assert_eq!(type_name, "Missing");
            assert_eq!(referenced_by, ".M.m");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_duplicate_field_id_rejected() {
    let err = protodyn::load_proto("message M { optional int32 a = 1; optional int32 b = 1; }")
        .unwrap_err();
    assert!(
        matches!(err, ProtoError::Build(BuildError::DuplicateId { id: 1, .. })),
        "{:?}",
        err
    );
}

#[test]
fn test_duplicate_message_name_rejected() {
    let err = protodyn::load_proto("message M {} message M {}").unwrap_err();
    assert!(
        matches!(err, ProtoError::Build(BuildError::DuplicateName { .. })),
        "{:?}",
        err
    );
}

#[test]
fn test_field_id_out_of_range() {
    let err = protodyn::load_proto("message M { optional int32 a = 0; }").unwrap_err();
    assert!(
        matches!(err, ProtoError::Build(BuildError::InvalidDefinition { .. })),
        "{:?}",
        err
    );
}

#[test]
fn test_built_namespace_tree() {
    let mut b = builder(
        r#"
        package app;
        enum Color { RED = 0; GREEN = 1; BLUE = 2; }
        message Outer {
            message Inner { optional int32 v = 1; }
            optional Inner inner = 1;
        }
        service Api { rpc Get (Outer) returns (Outer.Inner); }
        "#,
    );
    let root = b.build(None).unwrap();
    let app = root.get("app").unwrap();
    assert!(app.as_namespace().is_some());

    let color = app.get("Color").unwrap().as_enum().unwrap();
    assert_eq!(color.get("GREEN"), Some(&1));
    assert_eq!(color.len(), 3);

    let inner = root.message_type("app.Outer.Inner").unwrap();
    assert_eq!(inner.name(), "Inner");
    assert_eq!(inner.full_name(), ".app.Outer.Inner");

    let outer = root.message_type("app.Outer").unwrap();
    assert_eq!(outer.nested_type("Inner"), Some(inner.clone()));

    let api = root.path("app.Api").unwrap().as_service().unwrap();
    assert_eq!(api.full_name(), ".app.Api");
    let get = api.method("Get").unwrap();
    assert_eq!(get.request, outer);
    assert_eq!(get.response, inner);

    match b.build(Some("app.Missing")) {
        Err(BuildError::UnknownPath(path)) => assert_eq!(path, "app.Missing"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_method_must_reference_message() {
    let mut b = builder(
        r#"
        enum E { A = 0; }
        message M {}
        service S { rpc Call (E) returns (M); }
        "#,
    );
    assert!(matches!(
        b.build(None),
        Err(BuildError::Resolve(ResolveError::NotAMessage { .. }))
    ));
}

#[test]
fn test_define_and_extend_namespace_across_imports() {
    let mut b = Builder::new();
    b.import_proto("package a.b; message X { optional int32 v = 1; }", None)
        .unwrap();
    b.import_proto("package a.b; message Y { optional X x = 1; }", None)
        .unwrap();
    let root = b.build(None).unwrap();
    let ns = root.path("a.b").unwrap().as_namespace().unwrap();
    assert_eq!(ns.keys().collect::<Vec<_>>(), vec!["X", "Y"]);
    assert_eq!(
        root.message_type("a.b.Y").unwrap().fields()[0].type_name,
        ".a.b.X"
    );
}

#[test]
fn test_rebuild_after_import() {
    let mut b = builder("message A { optional int32 v = 1; }");
    let first = b.build(None).unwrap();
    assert!(b.is_resolved());
    b.import_proto("message B { optional A a = 1; }", None).unwrap();
    assert!(!b.is_resolved());
    let second = b.build(None).unwrap();
    assert!(first.get("B").is_none());
    assert!(second.get("B").is_some());
}

#[test]
fn test_extend_adds_fields() {
    let mut b = builder(
        r#"
        message Base {
            optional int32 id = 1;
            extensions 100 to 199;
        }
        extend Base { optional string note = 100; }
        "#,
    );
    let base = b.message_type("Base").unwrap();
    let names: Vec<String> = base.fields().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["id", "note"]);

    let msg = base
        .from_fields([("id", 1.into()), ("note", "hi".into())])
        .unwrap();
    let decoded = base.decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(decoded.get("note").unwrap(), &ProtoValue::from("hi"));
}

#[test]
fn test_extend_outside_range_rejected() {
    let err = protodyn::load_proto(
        r#"
        message Base { extensions 100 to 199; }
        extend Base { optional string note = 200; }
        "#,
    )
    .unwrap_err();
    assert!(
        matches!(err, ProtoError::Build(BuildError::ExtensionRange { id: 200, .. })),
        "{:?}",
        err
    );
}

#[test]
fn test_descriptor_extend_skipped() {
    let mut b = builder(
        r#"
        import "google/protobuf/descriptor.proto";
        extend google.protobuf.FieldOptions { optional bool secret = 50000; }
        message M { optional int32 v = 1 [(secret) = true]; }
        "#,
    );
    assert!(b.message_type("M").is_ok());
}

#[test]
fn test_camel_case_option() {
    let mut b = Builder::with_options(BuilderOptions {
        convert_field_names_to_camel_case: true,
        ..BuilderOptions::default()
    });
    b.import_proto("message M { optional int32 user_id = 1; }", None)
        .unwrap();
    let m = b.message_type("M").unwrap();
    assert_eq!(m.fields()[0].name, "userId");
    assert_eq!(m.field_index("userId"), Some(0));
}

#[test]
fn test_default_values() {
    let mut b = builder(
        r#"
        enum Level { LOW = 0; HIGH = 1; }
        message Config {
            optional int32 retries = 1 [default = 3];
            optional Level level = 2 [default = HIGH];
            optional string label = 3 [default = "none"];
            optional bool enabled = 4 [default = true];
        }
        "#,
    );
    let config = b.message_type("Config").unwrap().new_message();
    assert_eq!(config.get("retries").unwrap(), &ProtoValue::Int32(3));
    assert_eq!(config.get("level").unwrap(), &ProtoValue::Int32(1));
    assert_eq!(config.get("label").unwrap(), &ProtoValue::from("none"));
    assert_eq!(config.get("enabled").unwrap(), &ProtoValue::Bool(true));
}

#[test]
fn test_invalid_default_rejected() {
    let mut b = builder(
        r#"
        message Config { optional uint32 retries = 1 [default = -1]; }
        "#,
    );
    assert!(matches!(
        b.build(None),
        Err(BuildError::Resolve(ResolveError::InvalidDefault { .. }))
    ));
}

#[test]
fn test_import_file_with_relative_imports() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("common.proto"),
        "package common;\nmessage Money { required int64 cents = 1; }\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("invoice.proto"),
        r#"
        package billing;
        import "common.proto";
        message Invoice { required common.Money total = 1; }
        "#,
    )
    .unwrap();
    fs::write(
        dir.path().join("receipt.proto"),
        r#"
        package billing;
        import "common.proto";
        import "invoice.proto";
        message Receipt { required Invoice invoice = 1; }
        "#,
    )
    .unwrap();

    let mut b = protodyn::load_proto_file(dir.path().join("receipt.proto")).unwrap();
    // importing the same file again is a no-op
    b.import_file(dir.path().join("common.proto")).unwrap();

    let root = b.build(None).unwrap();
    let receipt = root.message_type("billing.Receipt").unwrap();
    assert_eq!(receipt.fields()[0].type_name, ".billing.Invoice");
    let invoice = root.message_type("billing.Invoice").unwrap();
    assert_eq!(invoice.fields()[0].type_name, ".common.Money");
}

#[test]
fn test_import_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = protodyn::load_proto_file(dir.path().join("absent.proto")).unwrap_err();
    assert!(
        matches!(err, ProtoError::Build(BuildError::Import { .. })),
        "{:?}",
        err
    );
}

#[test]
fn test_import_parse_error_names_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.proto");
    fs::write(&path, "message {").unwrap();
    match protodyn::load_proto_file(&path) {
        Err(ProtoError::Build(BuildError::ImportParse { path: p, .. })) => assert_eq!(p, path),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_import_root_option() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("shared")).unwrap();
    fs::write(
        dir.path().join("shared").join("ids.proto"),
        "message Id { required uint64 value = 1; }",
    )
    .unwrap();

    let mut b = Builder::with_options(BuilderOptions {
        import_root: Some(dir.path().to_path_buf()),
        ..BuilderOptions::default()
    });
    b.import_proto(
        r#"import "shared/ids.proto"; message User { required Id id = 1; }"#,
        None,
    )
    .unwrap();
    assert!(matches!(b.build(Some("Id")), Ok(Built::Message { .. })));
}

#[test]
fn test_schema_outline() {
    let b = builder("package p; message M { optional int32 v = 1; }");
    let outline = b.schema().to_string();
    assert!(outline.contains("M"), "{}", outline);
    assert!(outline.contains("v"), "{}", outline);
}
