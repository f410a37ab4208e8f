//! Schema loading: parse an entry `.proto` and its transitive imports, then link
//! them into a [`SchemaRegistry`].
//!
//! Imports are looked up against an ordered set of roots; the first match wins:
//!
//! 1. the literal path, when the import string is absolute (no other root is tried);
//! 2. the vendor directory produced by [`crate::vendor::VendorResolver`];
//! 3. the directory containing the dependency manifest;
//! 4. the current working directory;
//! 5. the directory containing the entry file;
//! 6. the bundled well-known types ([`crate::well_known`]).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::descriptor::{SchemaRegistry, SourceFile};
use crate::error::SchemaError;
use crate::parser::parse;
use crate::well_known;

/// Ordered lookup roots for import resolution.
#[derive(Debug, Clone)]
pub struct SearchRoots {
    pub vendor: Option<PathBuf>,
    pub manifest_root: Option<PathBuf>,
    pub working_dir: PathBuf,
}

/// Where an import was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    File(PathBuf),
    Bundled(&'static str),
}

impl SearchRoots {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        SearchRoots {
            vendor: None,
            manifest_root: None,
            working_dir: working_dir.into(),
        }
    }

    pub fn with_vendor(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vendor = Some(dir.into());
        self
    }

    pub fn with_manifest_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_root = Some(dir.into());
        self
    }

    /// Resolve one import string. On failure returns every path that was tried.
    pub fn locate(&self, import: &str, entry_dir: Option<&Path>) -> Result<Located, Vec<PathBuf>> {
        let literal = Path::new(import);
        if literal.is_absolute() {
            return if literal.is_file() {
                Ok(Located::File(literal.to_path_buf()))
            } else {
                Err(vec![literal.to_path_buf()])
            };
        }

        let mut tried = Vec::new();
        let roots = self
            .vendor
            .iter()
            .chain(self.manifest_root.iter())
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.working_dir.as_path()))
            .chain(entry_dir);
        for root in roots {
            let candidate = root.join(import);
            if candidate.is_file() {
                return Ok(Located::File(candidate));
            }
            tried.push(candidate);
        }

        well_known::lookup(import).map(Located::Bundled).ok_or(tried)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FileKey {
    Path(PathBuf),
    Bundled(String),
}

#[derive(Default)]
struct LoadState {
    files: Vec<SourceFile>,
    done: HashSet<FileKey>,
    stack: Vec<(FileKey, String)>,
}

/// Parses IDL files against a fixed set of [`SearchRoots`].
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    roots: SearchRoots,
}

impl SchemaLoader {
    pub fn new(roots: SearchRoots) -> Self {
        SchemaLoader { roots }
    }

    pub fn roots(&self) -> &SearchRoots {
        &self.roots
    }

    /// Load `entry` and everything it imports. Any unresolved import, syntax error
    /// or linking error fails the whole load.
    pub fn load(&self, entry: &Path) -> Result<SchemaRegistry, SchemaError> {
        let source = std::fs::read_to_string(entry).map_err(|source| SchemaError::Io {
            path: entry.to_path_buf(),
            source,
        })?;
        let entry_dir = entry.parent().filter(|p| !p.as_os_str().is_empty());
        let mut state = LoadState::default();
        self.visit(
            entry.display().to_string(),
            FileKey::Path(canonical(entry)),
            entry.to_path_buf(),
            &source,
            entry_dir,
            &mut state,
        )?;

        let registry = SchemaRegistry::link(&state.files)?;
        tracing::info!(
            entry = %entry.display(),
            files = state.files.len(),
            messages = registry.len(),
            "schema loaded"
        );
        Ok(registry)
    }

    fn visit(
        &self,
        name: String,
        key: FileKey,
        path: PathBuf,
        source: &str,
        entry_dir: Option<&Path>,
        state: &mut LoadState,
    ) -> Result<(), SchemaError> {
        let ast = parse(source).map_err(|message| SchemaError::Syntax {
            file: name.clone(),
            message,
        })?;
        state.stack.push((key.clone(), name.clone()));

        for import in &ast.imports {
            let located = self
                .roots
                .locate(&import.path, entry_dir)
                .map_err(|tried| SchemaError::UnresolvedImport {
                    import: import.path.clone(),
                    importer: name.clone(),
                    tried,
                })?;
            let (import_key, import_path, import_source) = match located {
                Located::File(p) => {
                    let key = FileKey::Path(canonical(&p));
                    if state.done.contains(&key) || state.stack.iter().any(|(k, _)| *k == key) {
                        (key, p, None)
                    } else {
                        let text = std::fs::read_to_string(&p).map_err(|source| SchemaError::Io {
                            path: p.clone(),
                            source,
                        })?;
                        (key, p, Some(text))
                    }
                }
                Located::Bundled(text) => (
                    FileKey::Bundled(import.path.clone()),
                    PathBuf::from(&import.path),
                    Some(text.to_string()),
                ),
            };

            if let Some(pos) = state.stack.iter().position(|(k, _)| *k == import_key) {
                let mut chain: Vec<String> = state.stack[pos..].iter().map(|(_, n)| n.clone()).collect();
                chain.push(import.path.clone());
                return Err(SchemaError::ImportCycle(chain));
            }
            if state.done.contains(&import_key) {
                continue;
            }
            let Some(import_source) = import_source else {
                continue;
            };
            tracing::debug!(import = %import.path, path = %import_path.display(), importer = %name, "resolved import");
            self.visit(
                import.path.clone(),
                import_key,
                import_path,
                &import_source,
                entry_dir,
                state,
            )?;
        }

        state.stack.pop();
        state.done.insert(key);
        state.files.push(SourceFile { name, path, ast });
        Ok(())
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
