//! Derived-field maintenance.
//!
//! `weight`, `progress`, `depth`, `is_leaf` and effort hours are aggregates owned by this
//! module. Their setters take a [`Rollup`] token that only code under `rollup` can build,
//! so lifecycle and cascade code cannot assign them directly.
//!
//! Upward walks are iterative: one bounded read-modify-write per ancestor, all staged in
//! the caller's unit of work and committed together.

pub mod progress;
pub mod weight;

use crate::error::Result;
use crate::store::{TaskStore, UnitOfWork};
use crate::task::TaskId;
use crate::tree;

/// Capability to write derived fields.
pub struct Rollup(());

const ROLLUP: Rollup = Rollup(());

/// Recompute `is_leaf` of `task_id` from its current subtasks.
pub fn refresh_leaf_flag<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    task_id: TaskId,
) -> Result<()> {
    let mut task = uow.require_task(task_id)?;
    let is_leaf = uow.subtasks(task_id).is_empty();
    if task.is_leaf() != is_leaf {
        task.set_leaf(&ROLLUP, is_leaf);
        tracing::debug!(task = task_id, is_leaf, "leaf flag changed");
        uow.stage_task(task);
    }
    Ok(())
}

/// Set the depth of every task in the subtree rooted at `root`, given the root's depth.
pub fn assign_depths<S: TaskStore + ?Sized>(uow: &mut UnitOfWork<'_, S>, root: TaskId, depth: u32) {
    for mut task in tree::subtree_breadth_first(uow, root) {
        let expected = match task.parent {
            Some(p) if task.id != root => uow.task(p).map_or(0, |p| p.depth() + 1),
            _ => depth,
        };
        if task.depth() != expected {
            task.set_depth(&ROLLUP, expected);
            uow.stage_task(task);
        }
    }
}

/// Bring every derived field of `task_id` and its ancestors up to date after a child was
/// attached, detached or changed weight.
pub fn refresh_from<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    task_id: TaskId,
) -> Result<()> {
    refresh_leaf_flag(uow, task_id)?;
    weight::recompute_weight(uow, task_id)?;
    progress::recompute_progress(uow, task_id)?;
    Ok(())
}
