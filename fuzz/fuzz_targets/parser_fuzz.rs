//! Schema fuzz target: arbitrary `.proto` text through parse, link and form
//! building. Any stage may reject the input, none may panic. A schema that
//! links must yield a finite form tree and an empty message that finalizes.

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use std::sync::Arc;
    use stratus::descriptor::{SchemaRegistry, SourceFile};
    use stratus::{Assembler, FormTree};

    let Ok(text) = std::str::from_utf8(data) else { return };
    let Ok(ast) = stratus::parse(text) else { return };
    let Ok(registry) = SchemaRegistry::link(&[SourceFile {
        name: "fuzz.proto".into(),
        path: "fuzz.proto".into(),
        ast,
    }]) else {
        return;
    };
    let registry = Arc::new(registry);
    let ids: Vec<_> = registry.entry_messages().map(|m| m.id()).collect();
    for id in ids {
        let tree = FormTree::build(&registry, id);
        assert!(tree.paths().iter().all(|p| !p.is_empty()));
        let assembler = Assembler::new(Arc::clone(&registry), id).expect("entry message");
        assert!(assembler.finalize().expect("empty message").bytes().is_empty());
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
