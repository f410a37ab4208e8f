//! Dependency vendoring: materialise the modules listed in a dependency manifest
//! into a fresh temporary directory, one fetch per module.
//!
//! A malformed manifest aborts the resolution. A failed fetch does not: every
//! dependency is attempted and its outcome recorded in the [`VendorReport`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use serde::Deserialize;
use tempfile::TempDir;

use crate::config::FetchConfig;
use crate::error::{FetchError, ManifestError, VendorError};

/// Dependency manifest (`buf.yaml` style). Keys other than `deps` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path)
    }

    fn from_yaml(content: &str, path: &Path) -> Result<Self, ManifestError> {
        // An empty file is a manifest without dependencies.
        if content.trim().is_empty() {
            return Ok(Manifest::default());
        }
        serde_yaml::from_str(content).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn modules(&self) -> Result<Vec<ModuleReference>, ManifestError> {
        self.deps.iter().map(|d| d.parse()).collect()
    }
}

/// An external schema module: `[origin/]owner/repo[:ref]`.
///
/// The first path segment is treated as the origin (remote host) when it
/// contains a dot, as in `buf.build/acme/common`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub name: String,
    pub origin: Option<String>,
    pub reference: Option<String>,
}

impl FromStr for ModuleReference {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (path, reference) = match raw.split_once(':') {
            Some((p, r)) if !r.is_empty() => (p, Some(r.to_string())),
            Some(_) => return Err(ManifestError::InvalidModule(raw.to_string())),
            None => (raw, None),
        };
        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(ManifestError::InvalidModule(raw.to_string()));
        }
        let (origin, name) = match path.split_once('/') {
            Some((first, rest)) if first.contains('.') => (Some(first.to_string()), rest.to_string()),
            _ => (None, path.to_string()),
        };
        Ok(ModuleReference {
            name,
            origin,
            reference,
        })
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "{}/", origin)?;
        }
        f.write_str(&self.name)?;
        if let Some(r) = &self.reference {
            write!(f, ":{}", r)?;
        }
        Ok(())
    }
}

/// Materialises one module's IDL sources into an output directory.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, module: &ModuleReference, output_dir: &Path) -> Result<(), FetchError>;
}

/// Runs an external tool, by default `buf export <module> -o <dir>`.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    output_flag: String,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["export".into()],
            output_flag: "-o".into(),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            program: config.tool.clone(),
            args: config.args.clone(),
            output_flag: config.output_flag.clone(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl Fetcher for CommandFetcher {
    fn fetch(&self, module: &ModuleReference, output_dir: &Path) -> Result<(), FetchError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(module.to_string())
            .arg(&self.output_flag)
            .arg(output_dir)
            .output()
            .map_err(|e| FetchError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(FetchError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Session-scoped vendor directory; removed from disk when dropped.
#[derive(Debug)]
pub struct VendorDir {
    dir: TempDir,
}

impl VendorDir {
    fn create() -> Result<Self, VendorError> {
        let dir = tempfile::Builder::new()
            .prefix("stratus-vendor-")
            .tempdir()
            .map_err(VendorError::TempDir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOutcome {
    pub module: ModuleReference,
    pub result: Result<(), FetchError>,
}

/// Per-dependency outcomes, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorReport {
    pub outcomes: Vec<DependencyOutcome>,
}

impl VendorReport {
    pub fn failures(&self) -> impl Iterator<Item = (&ModuleReference, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.module, e)))
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Result of vendoring one manifest.
#[derive(Debug)]
pub struct VendorResolution {
    /// `None` when the manifest declares no dependencies.
    pub vendor: Option<VendorDir>,
    pub report: VendorReport,
    /// Directory containing the manifest; the manifest-relative import root.
    pub manifest_root: PathBuf,
}

pub struct VendorResolver<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> VendorResolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Read `manifest_path` and fetch every dependency into a new vendor directory.
    /// Blocks for as long as the fetches take.
    pub fn resolve(&self, manifest_path: &Path) -> Result<VendorResolution, VendorError> {
        let manifest = Manifest::from_file(manifest_path)?;
        let modules = manifest.modules()?;
        let manifest_root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if modules.is_empty() {
            return Ok(VendorResolution {
                vendor: None,
                report: VendorReport::default(),
                manifest_root,
            });
        }

        let vendor = VendorDir::create()?;
        tracing::info!(
            manifest = %manifest_path.display(),
            deps = modules.len(),
            vendor = %vendor.path().display(),
            "resolving dependencies"
        );

        let mut report = VendorReport::default();
        for module in modules {
            let result = self.fetcher.fetch(&module, vendor.path());
            match &result {
                Ok(()) => tracing::debug!(module = %module, "fetched"),
                Err(e) => tracing::warn!(module = %module, error = %e, "fetch failed"),
            }
            report.outcomes.push(DependencyOutcome { module, result });
        }

        Ok(VendorResolution {
            vendor: Some(vendor),
            report,
            manifest_root,
        })
    }
}

/// Walk from `start` up through its ancestors looking for `file_name`.
pub fn find_manifest(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes one file per module, failing for names listed in `fail`.
    struct FakeFetcher {
        fail: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, module: &ModuleReference, output_dir: &Path) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push(module.to_string());
            if self.fail.contains(&module.name.as_str()) {
                return Err(FetchError::Exit {
                    status: "exit status: 1".into(),
                    stderr: "not found".into(),
                });
            }
            let dir = output_dir.join(&module.name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("types.proto"), "syntax = \"proto3\";").unwrap();
            Ok(())
        }
    }

    fn manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("buf.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn module_reference_parsing() {
        let m: ModuleReference = "buf.build/acme/common:v1".parse().unwrap();
        assert_eq!(m.origin.as_deref(), Some("buf.build"));
        assert_eq!(m.name, "acme/common");
        assert_eq!(m.reference.as_deref(), Some("v1"));
        assert_eq!(m.to_string(), "buf.build/acme/common:v1");

        let bare: ModuleReference = "acme/common".parse().unwrap();
        assert_eq!(bare.origin, None);
        assert_eq!(bare.name, "acme/common");

        assert!("acme//common".parse::<ModuleReference>().is_err());
        assert!("".parse::<ModuleReference>().is_err());
    }

    #[test]
    fn one_failed_fetch_does_not_abort_the_rest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = manifest(dir.path(), "version: v1\ndeps:\n  - acme/broken\n  - acme/common\n");
        let fetcher = FakeFetcher {
            fail: vec!["acme/broken"],
            calls: Mutex::new(Vec::new()),
        };

        let resolution = VendorResolver::new(&fetcher).resolve(&path).expect("resolve");
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
        assert_eq!(resolution.report.succeeded(), 1);
        let failures: Vec<_> = resolution.report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.name, "acme/broken");
        let vendor = resolution.vendor.as_ref().expect("vendor dir");
        assert!(vendor.path().join("acme/common/types.proto").is_file());
        assert_eq!(resolution.manifest_root, dir.path());
    }

    #[test]
    fn malformed_manifest_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = manifest(dir.path(), "deps: [unterminated\n");
        let fetcher = FakeFetcher {
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let err = VendorResolver::new(&fetcher).resolve(&path).unwrap_err();
        assert!(matches!(err, VendorError::Manifest(ManifestError::Yaml { .. })));
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn vendor_dir_is_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = manifest(dir.path(), "deps:\n  - acme/common\n");
        let fetcher = FakeFetcher {
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let resolution = VendorResolver::new(&fetcher).resolve(&path).unwrap();
        let vendor_path = resolution.vendor.as_ref().unwrap().path().to_path_buf();
        assert!(vendor_path.is_dir());
        drop(resolution);
        assert!(!vendor_path.exists());
    }

    #[test]
    fn no_dependencies_means_no_vendor_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = manifest(dir.path(), "version: v1\n");
        let fetcher = FakeFetcher {
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let resolution = VendorResolver::new(&fetcher).resolve(&path).unwrap();
        assert!(resolution.vendor.is_none());
        assert!(resolution.report.is_clean());
    }

    #[test]
    fn missing_program_is_a_spawn_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = CommandFetcher::new("stratus-definitely-not-a-real-binary");
        let module: ModuleReference = "acme/common".parse().unwrap();
        let err = fetcher.fetch(&module, dir.path()).unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
    }

    /// Stands in for the export tool: `$1` is the module, `$3` the output directory.
    #[cfg(unix)]
    const EXPORT_SCRIPT: &str = r#"case "$1" in *broken*) echo "no such module: $1" >&2; exit 3;; esac
mkdir -p "$3/$1" && touch "$3/$1/types.proto""#;

    #[cfg(unix)]
    fn shell_fetcher() -> CommandFetcher {
        CommandFetcher::new("sh").with_args(vec!["-c".into(), EXPORT_SCRIPT.into(), "export".into()])
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_status_and_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let module: ModuleReference = "acme/broken".parse().unwrap();
        match shell_fetcher().fetch(&module, dir.path()).unwrap_err() {
            FetchError::Exit { status, stderr } => {
                assert_eq!(status, "exit status: 3");
                assert_eq!(stderr, "no such module: acme/broken");
            }
            other => panic!("expected Exit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_failures_are_reported_per_dependency() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = manifest(dir.path(), "deps:\n  - acme/common\n  - acme/broken\n");
        let fetcher = shell_fetcher();
        let resolution = VendorResolver::new(&fetcher).resolve(&path).expect("resolve");
        assert_eq!(resolution.report.succeeded(), 1);
        let failures: Vec<_> = resolution.report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.name, "acme/broken");
        assert!(matches!(failures[0].1, FetchError::Exit { .. }));
        let vendor = resolution.vendor.as_ref().expect("vendor dir");
        assert!(vendor.path().join("acme/common/types.proto").is_file());
    }

    #[test]
    fn manifest_discovery_walks_ancestors() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("proto/acme/v1");
        std::fs::create_dir_all(&nested).unwrap();
        let path = manifest(dir.path(), "deps: []\n");
        assert_eq!(find_manifest(&nested, "buf.yaml"), Some(path));
        assert_eq!(find_manifest(&nested, "other.yaml"), None);
    }
}
