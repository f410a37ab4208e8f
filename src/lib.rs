//! # stratus: schema-driven message composer
//!
//! Opens a protobuf IDL file, vendors the dependencies its manifest declares,
//! resolves the transitive imports into a [`SchemaRegistry`], and lets any
//! message of that schema be filled in through a generic field tree and encoded
//! to wire bytes.
//!
//! ## Pipeline
//!
//! - **Vendor**: [`VendorResolver`] reads a `buf.yaml`-style manifest and runs a
//!   [`Fetcher`] per dependency into a temporary directory. A failed dependency
//!   is reported, not fatal.
//! - **Load**: [`SchemaLoader`] parses the entry file and every import, searching
//!   absolute path, vendor directory, manifest directory, working directory,
//!   entry directory, then the bundled well-known types.
//! - **Form**: [`FormTree`] turns a message descriptor into addressable paths
//!   (`customer.address.city`, `items[0].sku`).
//! - **Assemble**: [`Assembler`] holds a [`MessageInstance`], type-checks every
//!   write, and [`Assembler::finalize`] encodes it without consuming it.
//!
//! [`EditSession`] ties a form and an assembler together for text input, and
//! [`Workspace`] adds directory navigation plus background opening that
//! discards results made stale by navigation.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratus::{EditSession, SchemaLoader, SearchRoots};
//!
//! let registry = SchemaLoader::new(SearchRoots::new("."))
//!     .load("proto/order.proto".as_ref())
//!     .unwrap();
//! let mut session = EditSession::new(Arc::new(registry), "shop.Order").unwrap();
//! session.edit("id", "42").unwrap();
//! let message = session.finalize().unwrap();
//! println!("{}", message);
//! ```

pub mod assembler;
pub mod ast;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod dump;
pub mod error;
pub mod form;
pub mod instance;
pub mod loader;
pub mod parser;
pub mod publish;
pub mod session;
pub mod value;
pub mod vendor;
pub mod well_known;
pub mod workspace;

pub use assembler::{Assembler, FinalizedMessage, InstancePath, PathStep};
pub use ast::ProtoFile;
pub use codec::{Codec, CodecError};
pub use config::StratusConfig;
pub use descriptor::{FieldId, FieldKind, MessageId, ScalarType, SchemaRegistry};
pub use error::{EditError, OpenError, SchemaError, StructuralError, SubmitError, VendorError};
pub use form::{FormNode, FormTree};
pub use instance::{Element, MessageInstance};
pub use loader::{SchemaLoader, SearchRoots};
pub use parser::parse;
pub use publish::{FilePublisher, Publisher};
pub use session::{EditOutcome, EditSession};
pub use value::Value;
pub use vendor::{CommandFetcher, Fetcher, VendorReport, VendorResolver};
pub use workspace::{Entry, PendingOpen, Workspace};
