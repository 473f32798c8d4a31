use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::compile::Diagnostic;
use crate::pipeline::BuildOutcome;
use crate::walker::Classification;

/// Receives the outcome of every rebuild attempt.
pub trait Reporter: Send + 'static {
    fn report(&mut self, outcome: &BuildOutcome);
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Writes reports to `W` (stdout in the binary), one rendering per rebuild.
pub struct StreamReporter<W> {
    out: W,
    format: Format,
    /// Prefix stripped from displayed paths.
    display_root: PathBuf,
}

impl<W: Write + Send + 'static> StreamReporter<W> {
    pub fn new(out: W, format: Format, display_root: &Path) -> Self {
        Self {
            out,
            format,
            display_root: display_root.to_path_buf(),
        }
    }
}

impl<W: Write + Send + 'static> Reporter for StreamReporter<W> {
    fn report(&mut self, outcome: &BuildOutcome) {
        log_summary(outcome);
        let rendered = match self.format {
            Format::Text => render_text(outcome, &self.display_root),
            Format::Json => render_json(outcome, &self.display_root),
        };
        if let Err(err) = self.out.write_all(rendered.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::error!("failed to write build report: {err}");
        }
    }
}

fn display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn log_summary(outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Built(report) => {
            let failed = report.copy_failures();
            tracing::info!(
                copied = report.copy_outcomes.len() - failed,
                failed,
                diagnostics = report.compile.diagnostics.len(),
                ok = report.succeeded(),
                "build report"
            );
        }
        BuildOutcome::Failed(err) => tracing::error!("rebuild aborted: {err}"),
    }
}

/// Render the line-oriented operator report.
///
/// One `ok <path> <bytes>` / `fail <path> <error>` line per copied file, then any
/// compiler diagnostics, then `build ok` or `build failed`.
pub fn render_text(outcome: &BuildOutcome, root: &Path) -> String {
    let report = match outcome {
        BuildOutcome::Built(report) => report,
        BuildOutcome::Failed(err) => return format!("build failed: {err}\n"),
    };

    let mut out = String::new();
    for op in &report.copy_outcomes {
        let path = display(&op.source_path, root);
        match &op.error {
            None => out.push_str(&format!("ok {path} {}\n", op.bytes_copied)),
            Some(err) => out.push_str(&format!("fail {path} {err}\n")),
        }
    }
    for diag in &report.compile.diagnostics {
        out.push_str(&format!("{diag}\n"));
    }
    if report.compile.succeeded() {
        out.push_str("build ok\n");
    } else {
        out.push_str("build failed\n");
    }
    out
}

#[derive(Serialize)]
struct JsonCopy {
    path: String,
    bytes: u64,
    error: Option<String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    ok: bool,
    copied: usize,
    failed: usize,
    files: Vec<JsonCopy>,
    diagnostics: &'a [Diagnostic],
    error: Option<String>,
}

/// Render the outcome as a single JSON object followed by a newline.
pub fn render_json(outcome: &BuildOutcome, root: &Path) -> String {
    let json = match outcome {
        BuildOutcome::Built(report) => {
            let failed = report.copy_failures();
            JsonReport {
                ok: report.succeeded(),
                copied: report.copy_outcomes.len() - failed,
                failed,
                files: report
                    .copy_outcomes
                    .iter()
                    .map(|op| JsonCopy {
                        path: display(&op.source_path, root),
                        bytes: op.bytes_copied,
                        error: op.error.as_ref().map(|e| e.to_string()),
                    })
                    .collect(),
                diagnostics: &report.compile.diagnostics,
                error: None,
            }
        }
        BuildOutcome::Failed(err) => JsonReport {
            ok: false,
            copied: 0,
            failed: 0,
            files: Vec::new(),
            diagnostics: &[],
            error: Some(err.to_string()),
        },
    };

    match serde_json::to_string(&json) {
        Ok(s) => format!("{s}\n"),
        Err(e) => format!("{{\"ok\":false,\"error\":\"error serialising report: {e}\"}}\n"),
    }
}

/// Print a classification without building anything.
pub fn print_plan(classification: &Classification, root: &Path, json: bool) {
    if json {
        let rel = |paths: &[PathBuf]| -> Vec<String> { paths.iter().map(|p| display(p, root)).collect() };
        let value = serde_json::json!({
            "to_copy": rel(&classification.to_copy),
            "skipped": rel(&classification.skipped),
        });
        println!("{value}");
        return;
    }

    for path in &classification.to_copy {
        println!("copy {}", display(path, root));
    }
    for path in &classification.skipped {
        println!("compile {}", display(path, root));
    }
    println!(
        "{} to copy, {} left to the compiler",
        classification.to_copy.len(),
        classification.skipped.len()
    );
}
