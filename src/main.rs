use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use devbundle::cli::{Cli, Commands};
use devbundle::compile::CommandCompiler;
use devbundle::config::{DevBundleConfig, Layout};
use devbundle::orchestrator::Orchestrator;
use devbundle::output::{Format, Reporter, StreamReporter, print_plan};
use devbundle::pipeline::{Pipeline, Rebuild};
use devbundle::watcher::start_watcher;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { project, json } => {
            let (config, layout) = load_project(&project.root)?;
            let pipeline = pipeline(&config, &layout);
            let format = if json { Format::Json } else { Format::Text };
            let mut reporter = StreamReporter::new(std::io::stdout(), format, &layout.root);

            let outcome = pipeline.rebuild();
            reporter.report(&outcome);
            if !outcome.succeeded() {
                bail!("build failed");
            }
        }
        Commands::Watch {
            project,
            debounce_ms,
        } => {
            let (config, layout) = load_project(&project.root)?;
            let debounce = debounce_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.debounce());
            watch(&config, layout, debounce)?;
        }
        Commands::Plan { project, json } => {
            let (config, layout) = load_project(&project.root)?;
            let pipeline = pipeline(&config, &layout);
            let classification = pipeline
                .classifier()
                .classify(&layout.source_dir)
                .context("failed to walk source directory")?;
            print_plan(&classification, &layout.root, json);
        }
    }

    Ok(())
}

fn load_project(root: &Path) -> Result<(DevBundleConfig, Layout)> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("project root {} is not accessible", root.display()))?;
    let config = DevBundleConfig::load(&root);
    let layout = config.resolve(&root).context("invalid devbundle.toml")?;
    Ok((config, layout))
}

fn pipeline(config: &DevBundleConfig, layout: &Layout) -> Pipeline<CommandCompiler> {
    let compiler = CommandCompiler::new(config.compiler.program.clone(), &layout.root);
    Pipeline::new(config, layout, compiler)
}

/// Initial build, then watch the source directory until Ctrl-C or watcher death.
fn watch(config: &DevBundleConfig, layout: Layout, debounce: Duration) -> Result<()> {
    let pipeline = Arc::new(pipeline(config, &layout));
    let mut reporter = StreamReporter::new(std::io::stdout(), Format::Text, &layout.root);

    tracing::info!("initial build");
    reporter.report(&pipeline.rebuild());

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(watch_loop(
        layout,
        debounce,
        config.max_reset_failures,
        pipeline,
        reporter,
    ))
}

async fn watch_loop<R: Reporter>(
    layout: Layout,
    debounce: Duration,
    reset_limit: u32,
    pipeline: Arc<Pipeline<CommandCompiler>>,
    reporter: R,
) -> Result<()> {
    let (_handle, streams) = start_watcher(&layout.source_dir, pipeline.classifier().clone())
        .context("failed to start file watcher")?;

    let orchestrator = Orchestrator::new(layout.source_dir.clone(), debounce, pipeline, reporter)
        .with_reset_limit(reset_limit);

    tokio::select! {
        result = orchestrator.run(streams.events, streams.errors) => {
            let builds = result.context("giving up on rebuilds")?;
            bail!("file watcher stopped after {builds} rebuild(s)")
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
