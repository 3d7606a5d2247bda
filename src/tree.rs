//! Tree integrity: acyclicity, nesting policy and subtree walks.

use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::fields::NestingPolicy;
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{Task, TaskId};

/// Fail with `CircularHierarchy` if placing `task_id` under `proposed_parent` would make
/// the task its own ancestor. O(depth).
pub fn validate_acyclic<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    task_id: TaskId,
    proposed_parent: TaskId,
) -> Result<()> {
    let mut visited = HashSet::from([task_id]);
    let mut cursor = Some(proposed_parent);
    while let Some(id) = cursor {
        if !visited.insert(id) {
            return Err(EngineError::CircularHierarchy {
                task: task_id,
                parent: proposed_parent,
            });
        }
        cursor = uow.task(id).and_then(|t| t.parent);
    }
    Ok(())
}

/// Check that a child may hang under `parent` given the nesting policy.
pub fn check_nesting(policy: NestingPolicy, parent: &Task) -> Result<()> {
    match policy {
        NestingPolicy::MultiLevel => Ok(()),
        NestingPolicy::SingleLevel if parent.is_root() => Ok(()),
        NestingPolicy::SingleLevel => Err(EngineError::InconsistentHierarchy(format!(
            "task {} is itself a subtask; only one level of nesting is allowed",
            parent.id
        ))),
    }
}

/// Ancestor ids of a task, nearest first.
pub fn ancestors<S: TaskStore + ?Sized>(uow: &mut UnitOfWork<'_, S>, id: TaskId) -> Vec<TaskId> {
    let mut chain = Vec::new();
    let mut cursor = uow.task(id).and_then(|t| t.parent);
    while let Some(p) = cursor {
        if chain.contains(&p) {
            break;
        }
        chain.push(p);
        cursor = uow.task(p).and_then(|t| t.parent);
    }
    chain
}

/// Every descendant of `root` in depth-first post-order (children before their parent),
/// `root` itself last.
pub fn subtree_post_order<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    root: TaskId,
) -> Vec<TaskId> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            out.push(id);
            continue;
        }
        if !seen.insert(id) {
            continue;
        }
        stack.push((id, true));
        for child in uow.subtasks(id).into_iter().rev() {
            stack.push((child.id, false));
        }
    }
    out
}

/// Every task of the subtree rooted at `root` in breadth-first order, `root` first.
pub fn subtree_breadth_first<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    root: TaskId,
) -> Vec<Task> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    if let Some(task) = uow.task(root) {
        queue.push_back(task);
    }
    while let Some(task) = queue.pop_front() {
        if !seen.insert(task.id) {
            continue;
        }
        queue.extend(uow.subtasks(task.id));
        out.push(task);
    }
    out
}
