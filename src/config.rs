use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Name of the configuration file looked up in the project root.
pub const CONFIG_FILE: &str = "devbundle.toml";

/// Configuration loaded from `devbundle.toml` at the project root.
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevBundleConfig {
    /// Directory holding the sources, relative to the project root.
    pub source_dir: PathBuf,
    /// Directory the output tree is written to. Wiped on every rebuild.
    pub output_dir: PathBuf,
    /// Substrings that exclude a path from the walk and from the watcher.
    pub ignored: Vec<String>,
    /// File extensions routed to the compiler instead of being copied.
    pub compiled_extensions: Vec<String>,
    /// Compilation roots handed to the compiler, relative to the project root.
    pub entry_points: Vec<PathBuf>,
    /// Quiet period after the last change before a rebuild starts.
    pub debounce_ms: u64,
    /// Consecutive output reset failures after which `watch` gives up.
    pub max_reset_failures: u32,
    pub compiler: CompilerConfig,
}

impl Default for DevBundleConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("web"),
            output_dir: PathBuf::from("dist"),
            ignored: vec![
                "node_modules".to_string(),
                "package.json".to_string(),
                "pnpm-lock.yaml".to_string(),
            ],
            compiled_extensions: vec!["ts".to_string(), "tsx".to_string(), "js".to_string()],
            entry_points: vec![PathBuf::from("web/main.tsx")],
            debounce_ms: 1000,
            max_reset_failures: 3,
            compiler: CompilerConfig::default(),
        }
    }
}

/// The `[compiler]` table: which bundler to run and with what options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub program: String,
    pub bundle: bool,
    /// Source map mode passed through as `--sourcemap=<mode>`; `None` disables it.
    pub sourcemap: Option<String>,
    /// Single output file. When unset the bundle goes to the output directory.
    pub outfile: Option<PathBuf>,
    pub jsx: Option<String>,
    pub jsx_factory: Option<String>,
    pub jsx_fragment: Option<String>,
    pub jsx_import_source: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "esbuild".to_string(),
            bundle: true,
            sourcemap: Some("external".to_string()),
            outfile: Some(PathBuf::from("dist/main.js")),
            jsx: Some("automatic".to_string()),
            jsx_factory: Some("h".to_string()),
            jsx_fragment: Some("Fragment".to_string()),
            jsx_import_source: Some("preact".to_string()),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("output directory {output} overlaps source directory {source_dir}")]
    OverlappingDirs { output: PathBuf, source_dir: PathBuf },
    #[error("no entry points configured")]
    NoEntryPoints,
}

impl DevBundleConfig {
    /// Load configuration from `devbundle.toml` in the given root directory.
    ///
    /// Returns a default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Resolve every relative path against `root` and check the layout is safe to wipe.
    pub fn resolve(&self, root: &Path) -> Result<Layout, ConfigError> {
        let source_dir = normalize(&root.join(&self.source_dir));
        let output_dir = normalize(&root.join(&self.output_dir));

        if output_dir.starts_with(&source_dir) || source_dir.starts_with(&output_dir) {
            return Err(ConfigError::OverlappingDirs {
                output: output_dir,
                source_dir,
            });
        }
        if self.entry_points.is_empty() {
            return Err(ConfigError::NoEntryPoints);
        }

        Ok(Layout {
            entry_points: self.entry_points.iter().map(|p| root.join(p)).collect(),
            outfile: self.compiler.outfile.as_ref().map(|p| root.join(p)),
            root: root.to_path_buf(),
            source_dir,
            output_dir,
        })
    }
}

/// Resolve `.` and `..` lexically, then follow symlinks for the longest prefix
/// that exists on disk.
fn normalize(path: &Path) -> PathBuf {
    let mut lexical = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !lexical.pop() {
                    lexical.push(component);
                }
            }
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            return rest.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

/// Concrete paths for one project, fixed at startup.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub entry_points: Vec<PathBuf>,
    pub outfile: Option<PathBuf>,
}
