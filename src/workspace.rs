//! Navigation context: directory browsing, opening a `.proto` in the background,
//! and the editing session for the selected message.
//!
//! Every navigation bumps a generation counter and drops the open schema and
//! session. A background open remembers the generation it started under; a
//! result that arrives after the counter moved on is rejected by
//! [`Workspace::install`] and its vendor directory is removed with it. The
//! current schema and session survive an open until its result is installed,
//! so a failed or rejected open leaves them in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::StratusConfig;
use crate::descriptor::SchemaRegistry;
use crate::error::{OpenError, StructuralError};
use crate::loader::{SchemaLoader, SearchRoots};
use crate::session::EditSession;
use crate::vendor::{find_manifest, Fetcher, VendorDir, VendorReport, VendorResolver};

/// One line of the directory browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Parent,
    Directory(String),
    ProtoFile(String),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Parent => "..",
            Entry::Directory(n) | Entry::ProtoFile(n) => n,
        }
    }
}

/// A loaded schema plus the vendor directory its imports may point into.
#[derive(Debug)]
pub struct OpenSchema {
    path: PathBuf,
    registry: Arc<SchemaRegistry>,
    report: VendorReport,
    vendor: Option<VendorDir>,
}

impl OpenSchema {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Per-dependency fetch outcomes; failures here are warnings.
    pub fn report(&self) -> &VendorReport {
        &self.report
    }

    pub fn vendor_dir(&self) -> Option<&Path> {
        self.vendor.as_ref().map(VendorDir::path)
    }

    /// Fully-qualified names of the opened file's top-level messages.
    pub fn message_names(&self) -> Vec<String> {
        self.registry
            .entry_messages()
            .map(|m| m.full_name().to_string())
            .collect()
    }
}

/// Result of a finished background open, not yet installed.
#[derive(Debug)]
pub struct PreparedSchema {
    generation: u64,
    schema: OpenSchema,
}

impl PreparedSchema {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schema(&self) -> &OpenSchema {
        &self.schema
    }
}

/// Handle to a background open started by [`Workspace::begin_open`].
#[derive(Debug)]
pub struct PendingOpen {
    generation: u64,
    path: PathBuf,
    handle: JoinHandle<Result<OpenSchema, OpenError>>,
}

impl PendingOpen {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation. A fetch that is already running finishes anyway;
    /// its result is still rejected as stale once navigation has moved on.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub async fn wait(self) -> Result<PreparedSchema, OpenError> {
        match self.handle.await {
            Ok(Ok(schema)) => Ok(PreparedSchema {
                generation: self.generation,
                schema,
            }),
            Ok(Err(e)) => Err(e),
            Err(join) => {
                tracing::debug!(path = %self.path.display(), error = %join, "open task did not complete");
                Err(OpenError::Cancelled(self.path))
            }
        }
    }
}

pub struct Workspace {
    config: StratusConfig,
    fetcher: Arc<dyn Fetcher>,
    working_dir: PathBuf,
    current_dir: PathBuf,
    generation: u64,
    schema: Option<OpenSchema>,
    session: Option<EditSession>,
}

impl Workspace {
    /// Start browsing at `start`. Relative imports also resolve against the
    /// process working directory, and so does a relative `start`.
    pub fn new(config: StratusConfig, fetcher: Arc<dyn Fetcher>, start: impl Into<PathBuf>) -> Result<Self, OpenError> {
        let working_dir = std::env::current_dir().map_err(OpenError::WorkingDir)?;
        Ok(Self::with_working_dir(config, fetcher, start, working_dir))
    }

    pub fn with_working_dir(
        config: StratusConfig,
        fetcher: Arc<dyn Fetcher>,
        start: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let working_dir = working_dir.into();
        let start = start.into();
        let current_dir = if start.is_absolute() {
            start
        } else {
            let joined = working_dir.join(&start);
            fs::canonicalize(&joined).unwrap_or(joined)
        };
        Self {
            config,
            fetcher,
            working_dir,
            current_dir,
            generation: 0,
            schema: None,
            session: None,
        }
    }

    pub fn config(&self) -> &StratusConfig {
        &self.config
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schema(&self) -> Option<&OpenSchema> {
        self.schema.as_ref()
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    /// Sub-directories and `.proto` files of the current directory, sorted by
    /// name, preceded by `..` unless at the filesystem root.
    pub fn entries(&self) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for item in fs::read_dir(&self.current_dir)? {
            let item = item?;
            let name = item.file_name().to_string_lossy().into_owned();
            if item.file_type()?.is_dir() {
                entries.push(Entry::Directory(name));
            } else if Path::new(&name).extension().is_some_and(|e| e == "proto") {
                entries.push(Entry::ProtoFile(name));
            }
        }
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        if self.parent_dir().is_some() {
            entries.insert(0, Entry::Parent);
        }
        Ok(entries)
    }

    /// Move into a sub-directory (or `..`).
    pub fn enter(&mut self, name: &str) -> io::Result<()> {
        if name == ".." {
            self.up();
            return Ok(());
        }
        let target = self.current_dir.join(name);
        if !target.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", target.display()),
            ));
        }
        self.current_dir = target;
        self.invalidate();
        Ok(())
    }

    pub fn up(&mut self) {
        if let Some(parent) = self.parent_dir() {
            self.current_dir = parent.to_path_buf();
        }
        self.invalidate();
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.current_dir.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Drop the schema and session and make any pending open stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(schema) = self.schema.take() {
            tracing::debug!(path = %schema.path.display(), "schema discarded");
        }
        self.session = None;
    }

    /// Start resolving and loading `file` (relative to the current directory)
    /// on the blocking pool. Must be called inside a tokio runtime. Any earlier
    /// pending open becomes stale; the current schema stays until `install`.
    pub fn begin_open(&mut self, file: &str) -> PendingOpen {
        self.generation += 1;
        let path = self.current_dir.join(file);
        let config = self.config.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let working_dir = self.working_dir.clone();
        let task_path = path.clone();
        tracing::info!(path = %path.display(), generation = self.generation, "opening schema");
        let handle = tokio::task::spawn_blocking(move || prepare(&config, fetcher.as_ref(), &working_dir, &task_path));
        PendingOpen {
            generation: self.generation,
            path,
            handle,
        }
    }

    /// Install a finished open unless navigation moved on since it started.
    pub fn install(&mut self, prepared: PreparedSchema) -> Result<&OpenSchema, OpenError> {
        if prepared.generation != self.generation {
            tracing::warn!(
                path = %prepared.schema.path.display(),
                started = prepared.generation,
                current = self.generation,
                "discarding stale schema"
            );
            return Err(OpenError::Stale {
                path: prepared.schema.path,
            });
        }
        if let Some(old) = self.schema.take() {
            tracing::debug!(path = %old.path.display(), "schema replaced");
        }
        self.session = None;
        Ok(self.schema.insert(prepared.schema))
    }

    /// [`begin_open`](Self::begin_open), wait, then [`install`](Self::install).
    pub async fn open(&mut self, file: &str) -> Result<&OpenSchema, OpenError> {
        let prepared = self.begin_open(file).wait().await?;
        self.install(prepared)
    }

    /// Start editing `full_name` from the open schema, replacing any previous session.
    pub fn select(&mut self, full_name: &str) -> Result<&mut EditSession, StructuralError> {
        let registry = self
            .schema
            .as_ref()
            .map(|s| Arc::clone(&s.registry))
            .ok_or_else(|| StructuralError::UnknownMessage(full_name.to_string()))?;
        let session = EditSession::new(registry, full_name)?
            .with_event_type(self.config.session.default_event_type.clone());
        Ok(self.session.insert(session))
    }

    /// Abandon the current editing session.
    pub fn close_session(&mut self) {
        self.session = None;
    }
}

/// Blocking part of an open: vendor dependencies, then load and link.
fn prepare(
    config: &StratusConfig,
    fetcher: &dyn Fetcher,
    working_dir: &Path,
    file: &Path,
) -> Result<OpenSchema, OpenError> {
    let manifest = config.manifest.path.clone().or_else(|| {
        file.parent()
            .and_then(|dir| find_manifest(dir, &config.manifest.file_name))
    });

    let mut roots = SearchRoots::new(working_dir);
    let mut vendor = None;
    let mut report = VendorReport::default();
    if let Some(manifest) = manifest {
        let resolution = VendorResolver::new(fetcher).resolve(&manifest)?;
        for (module, error) in resolution.report.failures() {
            tracing::warn!(module = %module, %error, "dependency not vendored");
        }
        if let Some(dir) = &resolution.vendor {
            roots = roots.with_vendor(dir.path());
        }
        roots = roots.with_manifest_root(resolution.manifest_root);
        vendor = resolution.vendor;
        report = resolution.report;
    }

    let registry = SchemaLoader::new(roots).load(file)?;
    Ok(OpenSchema {
        path: file.to_path_buf(),
        registry: Arc::new(registry),
        report,
        vendor,
    })
}
