use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// The dependency manifest could not be read or parsed. Fatal to one resolution.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid module reference {0:?}")]
    InvalidModule(String),
}

/// A single dependency fetch failed. Recorded per dependency, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("fetch failed ({status}): {stderr}")]
    Exit { status: String, stderr: String },
}

/// Vendor resolution could not start or could not produce a directory.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to create vendor directory: {0}")]
    TempDir(#[source] std::io::Error),
}

/// Loading an IDL file and its imports failed. No partial registry is produced.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: {message}")]
    Syntax { file: String, message: String },

    #[error("{importer}: import {import:?} not found (tried {})", display_paths(.tried))]
    UnresolvedImport {
        import: String,
        importer: String,
        tried: Vec<PathBuf>,
    },

    #[error("import cycle: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error("{file}: unknown type {type_name:?} referenced from {scope}")]
    UnknownType {
        file: String,
        scope: String,
        type_name: String,
    },

    #[error("duplicate definition of {0}")]
    DuplicateName(String),

    #[error("{message}.{field}: {reason}")]
    InvalidField {
        message: String,
        field: String,
        reason: String,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An instance tree violated an invariant of its descriptors.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("unknown message type {0}")]
    UnknownMessage(String),

    #[error("field {field} does not belong to {message}")]
    ForeignField { message: String, field: String },

    #[error("field {field}: expected {expected}, got {actual}")]
    KindMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("field {field}: index {index} out of range (len {len})")]
    IndexOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A form edit addressed something that cannot take it. Text coercion failures are not errors.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("no field at path {0:?}")]
    UnknownPath(String),

    #[error("{0:?} is not an editable scalar")]
    NotScalar(String),

    #[error("{0:?} is not a repeated field")]
    NotRepeated(String),

    #[error("{0:?} is not a collapsed message")]
    NotExpandable(String),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Failure reported by the publisher collaborator.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Failed(String),

    #[error("publish failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Submitting a session failed; the session keeps its values.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Opening a `.proto` for editing failed. Navigation state is left untouched.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("resolution of {0} was cancelled")]
    Cancelled(PathBuf),

    #[error("resolution of {path} finished after navigating away")]
    Stale { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
