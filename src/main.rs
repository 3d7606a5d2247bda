//! # pm - project task trees
//!
//! A command-line engine for per-project task trees. Each project seats members with a
//! role; their tasks form a tree in which:
//!
//! - **Weights** of siblings share a 100-unit budget, and a parent's weight is the sum of
//!   its children's.
//! - **Progress** reported on leaves rolls up as a weighted average to the root.
//! - **Lifecycle**: assignees accept or reject leaf tasks, report progress and submit
//!   finished work; scrum masters and team leads approve or send it back.
//! - **Cascades**: assigning a task hands its whole subtree to the same member, and
//!   deleting a task removes every descendant.
//!
//! ## Quick Start
//!
//! ```bash
//! pm project add "Apollo"
//! pm member add apollo lead --role team-lead
//! pm member add apollo ana
//! pm add "Launch" --project apollo --as lead --weight 100
//! pm subtask 1 "Design" --weight 60
//! pm assign 2 ana --as lead
//! pm accept 2 --as ana
//! pm progress 2 50 --as ana
//! pm view 1
//! ```
//!
//! Data is stored in `~/.pm/tree.json`; engine options are read from `~/.pm/config.json`.
//! Set `RUST_LOG` (or `log-filter` in the config) to see engine events on stderr.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod cascade;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fields;
pub mod items;
pub mod lifecycle;
pub mod membership;
pub mod notify;
pub mod project;
pub mod rollup;
pub mod store;
pub mod task;
pub mod tree;

use cli::Cli;
use cmd::*;
use config::EngineConfig;
use db::JsonStore;
use error::AppError;
use notify::{LogSink, NotificationSink, OutboxSink};

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or("warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    // Determine PM directory
    let pm_dir = match cli.db.as_ref() {
        Some(db_path) => db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), |p| p.to_path_buf()),
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            let pm_dir = PathBuf::from(home).join(".pm");
            std::fs::create_dir_all(&pm_dir).map_err(|source| error::StoreError::Io {
                path: pm_dir.clone(),
                source,
            })?;
            pm_dir
        }
    };

    let config_path = cli.config.unwrap_or_else(|| pm_dir.join("config.json"));
    let config = EngineConfig::load(&config_path)?;
    init_tracing(&config);

    let db_path = cli.db.unwrap_or_else(|| pm_dir.join("tree.json"));
    let store = JsonStore::open(&db_path)?;
    tracing::debug!(db = %store.path().display(), config = %config_path.display(), "store opened");

    let sink: Box<dyn NotificationSink> = match &config.outbox {
        Some(path) if path.is_relative() => Box::new(OutboxSink::new(&pm_dir.join(path))),
        Some(path) => Box::new(OutboxSink::new(path)),
        None => Box::new(LogSink),
    };
    let mut session = Session { store, sink, config };
    let s = &mut session;

    match cli.command {
        Commands::Completions { .. } => unreachable!("completions handled above"),
        Commands::Project { action } => cmd_project(s, action),
        Commands::Member { action } => cmd_member(s, action),
        Commands::Add { title, project, actor, fields } => {
            cmd_add(s, title, project, actor, fields)
        }
        Commands::Subtask { parent, title, fields } => cmd_subtask(s, parent, title, fields),
        Commands::Item { action } => cmd_item(s, action),
        Commands::Assign { id, member, actor } => cmd_assign(s, id, member, actor),
        Commands::Update { id, actor, changes } => cmd_update(s, id, actor, changes),
        Commands::Accept { id, actor } => cmd_accept(s, id, actor),
        Commands::Reject { id, actor, reason } => cmd_reject(s, id, actor, reason),
        Commands::Progress { id, value, actor } => cmd_progress(s, id, value, actor),
        Commands::Submit { id, actor } => cmd_submit(s, id, actor),
        Commands::Approve { id, actor } => cmd_approve(s, id, actor),
        Commands::Decline { id, actor, reason } => cmd_decline(s, id, actor, reason),
        Commands::Delete { id } => cmd_delete(s, id),
        Commands::View { id, format, parents } => cmd_view(s, id, format, parents),
        Commands::List { project, assignee, tree } => cmd_list(s, project, assignee, tree),
        Commands::Recompute { id } => cmd_recompute(s, id),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
