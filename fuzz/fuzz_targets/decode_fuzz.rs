//! Decoder fuzz target: arbitrary wire bytes against a recursive schema with
//! packed, nested and oneof fields. Decoding must fail cleanly, never panic.

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
syntax = "proto3";
package fuzz;
message Node {
  int32 id = 1;
  repeated sint64 weights = 2;
  repeated Node children = 3;
  oneof payload { string text = 4; bytes blob = 5; fixed64 stamp = 6; }
  map<string, Node> named = 7;
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use std::sync::Arc;
    use stratus::descriptor::{SchemaRegistry, SourceFile};

    let Ok(ast) = stratus::parse(SCHEMA) else { return };
    let Ok(registry) = SchemaRegistry::link(&[SourceFile {
        name: "fuzz.proto".into(),
        path: "fuzz.proto".into(),
        ast,
    }]) else {
        return;
    };
    let codec = stratus::Codec::new(Arc::new(registry));
    if let Ok(instance) = codec.decode_message("fuzz.Node", data) {
        let _ = codec.encode_message(&instance);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
