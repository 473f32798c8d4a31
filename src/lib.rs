pub mod cli;
pub mod compile;
pub mod config;
pub mod copy;
pub mod orchestrator;
pub mod output;
pub mod output_tree;
pub mod pipeline;
pub mod walker;
pub mod watcher;
