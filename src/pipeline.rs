use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;

use crate::compile::{BundleOptions, CompileRequest, CompileResult, Compiler};
use crate::config::{DevBundleConfig, Layout};
use crate::copy::{CopyOutcome, copy_files};
use crate::output_tree::{self, OutputResetError};
use crate::walker::{Classifier, WalkError};

/// Everything one completed rebuild produced.
#[derive(Debug)]
pub struct BuildReport {
    pub copy_outcomes: Vec<CopyOutcome>,
    pub compile: CompileResult,
}

impl BuildReport {
    pub fn copy_failures(&self) -> usize {
        self.copy_outcomes.iter().filter(|o| !o.is_ok()).count()
    }

    pub fn succeeded(&self) -> bool {
        self.copy_failures() == 0 && self.compile.succeeded()
    }
}

/// Why a rebuild stopped before copying anything.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error(transparent)]
    OutputReset(#[from] OutputResetError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("rebuild panicked: {0}")]
    Panicked(String),
}

/// The result of one rebuild attempt. Every attempt yields exactly one.
#[derive(Debug)]
pub enum BuildOutcome {
    Built(BuildReport),
    Failed(RebuildError),
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, BuildOutcome::Built(report) if report.succeeded())
    }
}

/// A full rebuild of the output tree.
pub trait Rebuild: Send + Sync + 'static {
    fn rebuild(&self) -> BuildOutcome;
}

/// reset → copy → compile, against one fixed project layout.
pub struct Pipeline<C> {
    source_dir: PathBuf,
    output_dir: PathBuf,
    classifier: Classifier,
    request: CompileRequest,
    compiler: C,
}

impl<C: Compiler> Pipeline<C> {
    pub fn new(config: &DevBundleConfig, layout: &Layout, compiler: C) -> Self {
        Self {
            source_dir: layout.source_dir.clone(),
            output_dir: layout.output_dir.clone(),
            classifier: Classifier::new(
                config.ignored.clone(),
                config.compiled_extensions.clone(),
            ),
            request: CompileRequest {
                entry_points: layout.entry_points.clone(),
                output_dir: layout.output_dir.clone(),
                options: BundleOptions::from_config(&config.compiler, layout.outfile.clone()),
            },
            compiler,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn run(&self) -> Result<BuildReport, RebuildError> {
        output_tree::reset(&self.output_dir)?;

        let classification = self.classifier.classify(&self.source_dir)?;
        tracing::debug!(
            to_copy = classification.to_copy.len(),
            skipped = classification.skipped.len(),
            "classified sources"
        );

        let copy_outcomes = copy_files(&self.source_dir, &self.output_dir, &classification.to_copy);
        let compile = self.compiler.compile(&self.request);

        Ok(BuildReport {
            copy_outcomes,
            compile,
        })
    }
}

impl<C: Compiler> Rebuild for Pipeline<C> {
    fn rebuild(&self) -> BuildOutcome {
        let started = Instant::now();
        let outcome = match self.run() {
            Ok(report) => BuildOutcome::Built(report),
            Err(err) => BuildOutcome::Failed(err),
        };
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.succeeded(),
            "rebuild finished"
        );
        outcome
    }
}
