use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::CompilerConfig;

/// Options forwarded to the bundler untouched by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    pub bundle: bool,
    pub sourcemap: Option<String>,
    pub outfile: Option<PathBuf>,
    pub jsx: Option<String>,
    pub jsx_factory: Option<String>,
    pub jsx_fragment: Option<String>,
    pub jsx_import_source: Option<String>,
    pub extra_args: Vec<String>,
}

impl BundleOptions {
    /// Build options from the `[compiler]` table; `outfile` must already be resolved.
    pub fn from_config(config: &CompilerConfig, outfile: Option<PathBuf>) -> Self {
        Self {
            bundle: config.bundle,
            sourcemap: config.sourcemap.clone(),
            outfile,
            jsx: config.jsx.clone(),
            jsx_factory: config.jsx_factory.clone(),
            jsx_fragment: config.jsx_fragment.clone(),
            jsx_import_source: config.jsx_import_source.clone(),
            extra_args: config.extra_args.clone(),
        }
    }
}

/// Everything the compiler needs for one invocation.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub entry_points: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub options: BundleOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

/// A compiler message. Reported, never fatal to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {}", self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " ({}:{}:{})", loc.file.display(), loc.line, loc.column)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileResult {
    pub diagnostics: Vec<Diagnostic>,
    /// False means no valid bundle may be assumed to exist for this invocation.
    pub wrote_output: bool,
}

impl CompileResult {
    pub fn succeeded(&self) -> bool {
        self.wrote_output
            && !self
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error)
    }
}

/// The source-to-bundle step. Blocks until the bundle is written or rejected.
pub trait Compiler: Send + Sync + 'static {
    fn compile(&self, request: &CompileRequest) -> CompileResult;
}

/// Runs an esbuild-compatible bundler as a child process.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    working_dir: PathBuf,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, working_dir: &Path) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.to_path_buf(),
        }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, request: &CompileRequest) -> CompileResult {
        let args = bundler_args(request);
        tracing::debug!(program = %self.program, ?args, "invoking compiler");

        let output = match Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .output()
        {
            Ok(o) => o,
            Err(err) => {
                return CompileResult {
                    diagnostics: vec![Diagnostic::error(format!(
                        "failed to launch {}: {err}",
                        self.program
                    ))],
                    wrote_output: false,
                };
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = parse_diagnostics(&stderr);

        if !output.status.success() && diagnostics.is_empty() {
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                detail.to_string()
            };
            diagnostics.push(Diagnostic::error(message));
        }

        CompileResult {
            diagnostics,
            wrote_output: output.status.success(),
        }
    }
}

/// Command-line arguments in esbuild's flag syntax.
pub fn bundler_args(request: &CompileRequest) -> Vec<String> {
    let opts = &request.options;
    let mut args: Vec<String> = request
        .entry_points
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    if opts.bundle {
        args.push("--bundle".to_string());
    }
    match &opts.outfile {
        Some(outfile) => args.push(format!("--outfile={}", outfile.display())),
        None => args.push(format!("--outdir={}", request.output_dir.display())),
    }
    if let Some(mode) = &opts.sourcemap {
        args.push(format!("--sourcemap={mode}"));
    }
    if let Some(jsx) = &opts.jsx {
        args.push(format!("--jsx={jsx}"));
    }
    if let Some(factory) = &opts.jsx_factory {
        args.push(format!("--jsx-factory={factory}"));
    }
    if let Some(fragment) = &opts.jsx_fragment {
        args.push(format!("--jsx-fragment={fragment}"));
    }
    if let Some(source) = &opts.jsx_import_source {
        args.push(format!("--jsx-import-source={source}"));
    }
    args.extend(opts.extra_args.iter().cloned());
    args
}

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:✘|X)\s*\[ERROR\]\s*(.+?)\s*$|^\s*(?:▲|!)\s*\[WARNING\]\s*(.+?)\s*$")
        .expect("valid header regex")
});

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(\S[^:]*):(\d+):(\d+):\s*$").expect("valid location regex")
});

/// Extract esbuild-style `[ERROR]` / `[WARNING]` blocks from compiler output.
///
/// The first `file:line:col:` line following a header becomes its location.
pub fn parse_diagnostics(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut awaiting_location = false;

    for line in text.lines() {
        if let Some(caps) = HEADER_RE.captures(line) {
            let (severity, message) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (Severity::Error, m.as_str()),
                (None, Some(m)) => (Severity::Warning, m.as_str()),
                (None, None) => continue,
            };
            diagnostics.push(Diagnostic {
                severity,
                message: message.to_string(),
                location: None,
            });
            awaiting_location = true;
            continue;
        }

        if awaiting_location
            && let Some(caps) = LOCATION_RE.captures(line)
            && let Some(last) = diagnostics.last_mut()
        {
            last.location = Some(Location {
                file: PathBuf::from(&caps[1]),
                line: caps[2].parse().unwrap_or(0),
                column: caps[3].parse().unwrap_or(0),
            });
            awaiting_location = false;
        }
    }

    diagnostics
}
