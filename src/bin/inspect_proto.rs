//! Decode an encoded message against a schema and print it.
//!
//! Usage:
//!   inspect_proto [--include DIR ...] SCHEMA.proto MESSAGE [FILE.bin]
//!
//! Reads the encoded bytes from FILE.bin, or from stdin when omitted. Imports are
//! resolved against each --include directory (as vendor roots, first one wins),
//! then the working directory and the schema's own directory.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use stratus::dump::instance_to_dump;
use stratus::{Codec, SchemaLoader, SearchRoots};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_env("STRATUS_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut includes = Vec::new();
    while let Some(pos) = args.iter().position(|a| a == "--include" || a == "-I") {
        args.remove(pos);
        if pos >= args.len() {
            bail!("--include needs a directory");
        }
        includes.push(PathBuf::from(args.remove(pos)));
    }
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: inspect_proto [--include DIR ...] SCHEMA.proto MESSAGE [FILE.bin]");
    }

    let mut roots = SearchRoots::new(std::env::current_dir()?);
    let mut includes = includes.into_iter();
    if let Some(first) = includes.next() {
        roots = roots.with_vendor(first);
    }
    if let Some(second) = includes.next() {
        roots = roots.with_manifest_root(second);
    }
    if includes.next().is_some() {
        bail!("at most two --include directories are supported");
    }

    let registry = SchemaLoader::new(roots)
        .load(args[0].as_ref())
        .with_context(|| format!("loading {}", args[0]))?;
    let registry = Arc::new(registry);

    let bytes = match args.get(2) {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let codec = Codec::new(Arc::clone(&registry));
    let instance = codec
        .decode_message(&args[1], &bytes)
        .with_context(|| format!("decoding {} ({} bytes)", args[1], bytes.len()))?;
    println!("{}", instance_to_dump(&registry, &instance, 0));
    Ok(())
}
