//! Bundled `google/protobuf/*.proto` sources, the last import root.
//!
//! Schemas routinely import these without vendoring them, so they resolve even
//! when no vendor directory or manifest is present.

const ANY: &str = r#"
syntax = "proto3";
package google.protobuf;
message Any {
  string type_url = 1;
  bytes value = 2;
}
"#;

const DURATION: &str = r#"
syntax = "proto3";
package google.protobuf;
message Duration {
  int64 seconds = 1;
  int32 nanos = 2;
}
"#;

const EMPTY: &str = r#"
syntax = "proto3";
package google.protobuf;
message Empty {}
"#;

const FIELD_MASK: &str = r#"
syntax = "proto3";
package google.protobuf;
message FieldMask {
  repeated string paths = 1;
}
"#;

const TIMESTAMP: &str = r#"
syntax = "proto3";
package google.protobuf;
message Timestamp {
  int64 seconds = 1;
  int32 nanos = 2;
}
"#;

const WRAPPERS: &str = r#"
syntax = "proto3";
package google.protobuf;
message DoubleValue { double value = 1; }
message FloatValue { float value = 1; }
message Int64Value { int64 value = 1; }
message UInt64Value { uint64 value = 1; }
message Int32Value { int32 value = 1; }
message UInt32Value { uint32 value = 1; }
message BoolValue { bool value = 1; }
message StringValue { string value = 1; }
message BytesValue { bytes value = 1; }
"#;

const BUNDLED: &[(&str, &str)] = &[
    ("google/protobuf/any.proto", ANY),
    ("google/protobuf/duration.proto", DURATION),
    ("google/protobuf/empty.proto", EMPTY),
    ("google/protobuf/field_mask.proto", FIELD_MASK),
    ("google/protobuf/timestamp.proto", TIMESTAMP),
    ("google/protobuf/wrappers.proto", WRAPPERS),
];

/// Source of a bundled well-known import, if `import` names one.
pub fn lookup(import: &str) -> Option<&'static str> {
    BUNDLED
        .iter()
        .find(|(name, _)| *name == import)
        .map(|(_, source)| *source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn every_bundled_file_parses() {
        for (name, source) in BUNDLED {
            let file = parse(source).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(file.package.as_deref(), Some("google.protobuf"));
        }
    }

    #[test]
    fn lookup_by_import_path() {
        assert!(lookup("google/protobuf/timestamp.proto").is_some());
        assert!(lookup("acme/common/types.proto").is_none());
    }
}
