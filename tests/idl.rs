//! IDL tests: parser syntax (success/failure) and linking semantics through the public API.

use std::fs;
use std::path::Path;

use stratus::ast::{ImportKind, Label, Literal, Reserved, Syntax, TypeSpec};
use stratus::descriptor::{FieldKind, ScalarType, SourceFile};
use stratus::{parse, SchemaError, SchemaLoader, SchemaRegistry, SearchRoots};
use tempfile::TempDir;

fn link(src: &str) -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::link(&[SourceFile {
        name: "idl.proto".into(),
        path: "idl.proto".into(),
        ast: parse(src).expect("parse"),
    }])
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

// ==================== Syntax: valid files ====================

#[test]
fn parse_empty_file_is_proto2() {
    let f = parse("").expect("empty file parses");
    assert_eq!(f.syntax, Syntax::Proto2);
    assert!(f.package.is_none());
    assert!(f.messages.is_empty());
}

#[test]
fn parse_header_imports_and_options() {
    let src = r#"
// leading comment
syntax = "proto3";
package acme.billing.v1;

import "google/protobuf/timestamp.proto";
import public "acme/common.proto";
import weak 'legacy.proto';

option java_package = "com.acme.billing";
option optimize_for = SPEED;
option (acme.custom) = { key: "value" };
"#;
    let f = parse(src).expect("parse");
    assert_eq!(f.syntax, Syntax::Proto3);
    assert_eq!(f.package.as_deref(), Some("acme.billing.v1"));
    let kinds: Vec<_> = f.imports.iter().map(|i| (i.path.as_str(), i.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("google/protobuf/timestamp.proto", ImportKind::Default),
            ("acme/common.proto", ImportKind::Public),
            ("legacy.proto", ImportKind::Weak),
        ]
    );
    assert_eq!(f.options[0].value, Literal::String("com.acme.billing".into()));
    assert_eq!(f.options[1].value, Literal::Ident("SPEED".into()));
    assert!(matches!(f.options[2].value, Literal::Aggregate(_)));
}

#[test]
fn parse_fields_labels_maps_and_oneofs() {
    let src = r#"
syntax = "proto2";
message Invoice {
  required string number = 1;
  optional int64 total_cents = 2 [default = 0];
  repeated string notes = 3;
  map<string, int32> counters = 4;
  oneof payer {
    string email = 5;
    int64 account_id = 6;
  }
  /* block comment */
  fixed32 checksum = 0x10;
}
"#;
    let f = parse(src).expect("parse");
    let m = &f.messages[0];
    assert_eq!(m.name, "Invoice");
    assert_eq!(m.fields.len(), 7);
    assert_eq!(m.fields[0].label, Some(Label::Required));
    assert_eq!(m.fields[1].option("default"), Some(&Literal::Int(0)));
    assert_eq!(m.fields[2].label, Some(Label::Repeated));
    assert_eq!(
        m.fields[3].type_spec,
        TypeSpec::Map {
            key: "string".into(),
            value: "int32".into()
        }
    );
    assert_eq!(m.oneofs, vec!["payer".to_string()]);
    assert_eq!(m.fields[4].oneof, Some(0));
    assert_eq!(m.fields[5].oneof, Some(0));
    assert_eq!(m.fields[6].number, 16);
}

#[test]
fn parse_reserved_and_nested_definitions() {
    let src = r#"
message Outer {
  reserved 2, 9 to 11, 100 to max;
  reserved "old_name", "older_name";
  message Inner { optional bool flag = 1; }
  enum Kind { KIND_UNKNOWN = 0; KIND_A = 1; }
  optional Inner inner = 1;
}
"#;
    let f = parse(src).expect("parse");
    let m = &f.messages[0];
    assert_eq!(m.messages[0].name, "Inner");
    assert_eq!(m.enums[0].values.len(), 2);
    assert!(m.reserved.contains(&Reserved::Range { start: 9, end: 11 }));
    assert!(m.reserved.contains(&Reserved::Range {
        start: 100,
        end: i64::MAX
    }));
    assert!(m.reserved.contains(&Reserved::Name("older_name".into())));
}

#[test]
fn parse_services_with_streaming() {
    let src = r#"
syntax = "proto3";
message Req {}
message Resp {}
service Billing {
  rpc Charge(Req) returns (Resp);
  rpc Watch(Req) returns (stream Resp) { option deprecated = true; }
  rpc Upload(stream Req) returns (Resp) {}
}
"#;
    let f = parse(src).expect("parse");
    let methods = &f.services[0].methods;
    assert_eq!(methods.len(), 3);
    assert!(!methods[0].client_streaming && !methods[0].server_streaming);
    assert!(methods[1].server_streaming && !methods[1].client_streaming);
    assert!(methods[2].client_streaming && !methods[2].server_streaming);
}

#[test]
fn keywords_as_identifier_prefixes() {
    let src = "syntax = \"proto3\"; message optionalThing { int32 messageCount = 1; string repeatedly = 2; }";
    let f = parse(src).expect("parse");
    assert_eq!(f.messages[0].name, "optionalThing");
    assert_eq!(f.messages[0].fields[0].name, "messageCount");
    assert_eq!(f.messages[0].fields[1].label, None);
}

// ==================== Syntax: invalid files ====================

#[test]
fn reject_missing_semicolon() {
    assert!(parse("syntax = \"proto3\"; message M { int32 a = 1 }").is_err());
}

#[test]
fn reject_unknown_syntax_level() {
    let err = parse("syntax = \"proto4\";").unwrap_err();
    assert!(err.contains("proto4"));
}

#[test]
fn reject_empty_enum() {
    assert!(parse("enum E {}").is_err());
}

#[test]
fn reject_two_packages() {
    assert!(parse("package a; package b;").is_err());
}

#[test]
fn reject_field_without_number() {
    assert!(parse("message M { optional int32 a; }").is_err());
}

// ==================== Linking ====================

#[test]
fn link_resolves_scopes_and_labels() {
    let reg = link(
        r#"
syntax = "proto3";
package acme.v1;
enum Status { STATUS_UNSPECIFIED = 0; ACTIVE = 1; }
message Account {
  message Contact { string email = 1; }
  string id = 1;
  Status status = 2;
  repeated Contact contacts = 3;
  optional uint32 tier = 4;
}
"#,
    )
    .expect("link");
    let account = reg.get_message("acme.v1.Account").expect("Account");
    let contact = reg.get_message("acme.v1.Account.Contact").expect("Contact");
    let f = account.fields();
    assert_eq!(f[0].kind(), FieldKind::Scalar(ScalarType::String));
    assert!(matches!(f[1].kind(), FieldKind::Enum(_)));
    assert_eq!(f[1].type_name(&reg), "acme.v1.Status");
    assert_eq!(f[2].kind(), FieldKind::Message(contact.id()));
    assert_eq!(f[2].label_name(), "repeated");
    assert_eq!(f[3].label_name(), "optional");
    assert!(f[3].has_explicit_presence());
    let names: Vec<_> = reg.entry_messages().map(|m| m.full_name().to_string()).collect();
    assert_eq!(names, vec!["acme.v1.Account"]);
}

#[test]
fn link_rejects_unknown_types() {
    let err = link("syntax = \"proto3\"; message M { acme.Missing m = 1; }").unwrap_err();
    assert!(matches!(err, SchemaError::UnknownType { .. }));
}

// ==================== Loading from disk ====================

#[test]
fn load_follows_imports_across_roots() {
    let work = TempDir::new().unwrap();
    let vendor = TempDir::new().unwrap();
    let module = TempDir::new().unwrap();
    write(
        vendor.path(),
        "acme/money.proto",
        "syntax = \"proto3\"; package acme; message Money { string currency = 1; int64 units = 2; }",
    );
    write(
        module.path(),
        "billing/invoice.proto",
        r#"
syntax = "proto3";
package billing;
import "acme/money.proto";
import "google/protobuf/timestamp.proto";
message Invoice {
  acme.Money total = 1;
  google.protobuf.Timestamp issued_at = 2;
}
"#,
    );
    let roots = SearchRoots::new(work.path())
        .with_vendor(vendor.path())
        .with_manifest_root(module.path());
    let reg = SchemaLoader::new(roots)
        .load(&module.path().join("billing/invoice.proto"))
        .expect("load");

    let invoice = reg.get_message("billing.Invoice").expect("Invoice");
    assert_eq!(invoice.fields()[0].type_name(&reg), "acme.Money");
    assert_eq!(invoice.fields()[1].type_name(&reg), "google.protobuf.Timestamp");
    assert_eq!(reg.files().len(), 3);
    assert_eq!(reg.entry_messages().count(), 1);
}

#[test]
fn load_reports_every_tried_root() {
    let work = TempDir::new().unwrap();
    let vendor = TempDir::new().unwrap();
    write(work.path(), "main.proto", "syntax = \"proto3\"; import \"nowhere/x.proto\";");
    let roots = SearchRoots::new(work.path()).with_vendor(vendor.path());
    let err = SchemaLoader::new(roots)
        .load(&work.path().join("main.proto"))
        .unwrap_err();
    match err {
        SchemaError::UnresolvedImport { import, tried, .. } => {
            assert_eq!(import, "nowhere/x.proto");
            assert_eq!(tried[0], vendor.path().join("nowhere/x.proto"));
            assert!(tried.contains(&work.path().join("nowhere/x.proto")));
        }
        other => panic!("expected UnresolvedImport, got {other:?}"),
    }
}
