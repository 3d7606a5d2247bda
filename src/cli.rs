use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Project task trees with weight budgets, weighted progress and a review lifecycle.
/// Storage defaults to ~/.pm/tree.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "pm", version, about = "Project task-tree manager")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the engine config file (defaults to config.json next to the database).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
