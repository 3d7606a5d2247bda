//! Progress aggregation.
//!
//! A parent's progress is the weight-weighted average of its direct children (subtasks
//! and leaf items alike), and 0 when their total weight is 0. Effort hours roll up by
//! plain addition. Recomputation always derives from current children, never from the
//! previous value, so running it twice yields the same result.

use super::ROLLUP;
use crate::error::{EngineError, Result};
use crate::store::{Children, TaskStore, UnitOfWork};
use crate::task::{LeafItemId, TaskId};

/// `Σ(progress × weight) / Σ(weight)`, or 0 when the total weight is 0.
pub fn weighted_progress(children: &Children) -> f64 {
    let (num, den) = children
        .shares()
        .fold((0.0, 0u32), |(num, den), (w, p)| (num + p * f64::from(w), den + w));
    if den == 0 {
        0.0
    } else {
        num / f64::from(den)
    }
}

/// Accept progress values in `0..=100`.
pub fn validate_progress(value: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(EngineError::validation("progress", format!("{value} is outside 0..=100")))
    }
}

/// Store a member-reported progress value on a leaf task and roll it up to the root.
/// Lifecycle gates are the caller's job.
pub fn set_leaf_progress<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    task_id: TaskId,
    value: f64,
) -> Result<()> {
    let value = validate_progress(value)?;
    let mut task = uow.require_task(task_id)?;
    task.set_progress(&ROLLUP, value);
    let parent = task.parent;
    uow.stage_task(task);
    if let Some(parent) = parent {
        recompute_progress(uow, parent)?;
    }
    Ok(())
}

/// Store a progress value on a leaf item and roll it up through its task.
pub fn set_item_progress<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    item_id: LeafItemId,
    value: f64,
) -> Result<()> {
    let value = validate_progress(value)?;
    let mut item = uow.require_leaf_item(item_id)?;
    item.set_progress(&ROLLUP, value);
    let task_id = item.task_id;
    uow.stage_leaf_item(item);
    recompute_progress(uow, task_id)?;
    Ok(())
}

/// Recompute progress and effort hours of `start` and every ancestor up to the root.
/// Returns the ids visited, nearest first.
pub fn recompute_progress<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    start: TaskId,
) -> Result<Vec<TaskId>> {
    let mut visited = Vec::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if visited.contains(&id) {
            return Err(EngineError::CircularHierarchy { task: start, parent: id });
        }
        visited.push(id);

        let mut task = uow.require_task(id)?;
        let children = uow.children(id);
        if !children.is_empty() {
            let progress = weighted_progress(&children);
            let estimated = children.subtasks.iter().map(|t| t.estimated_hours()).sum::<f64>();
            let actual = children.subtasks.iter().map(|t| t.actual_hours()).sum::<f64>();
            // Leaf items carry no hours of their own; the owning task keeps its estimate.
            let (estimated, actual) = if children.subtasks.is_empty() {
                (task.estimated_hours(), task.actual_hours())
            } else {
                (estimated, actual)
            };
            if task.progress() != progress
                || task.estimated_hours() != estimated
                || task.actual_hours() != actual
            {
                tracing::debug!(
                    task = id,
                    from = task.progress(),
                    to = progress,
                    "progress recomputed"
                );
                task.set_progress(&ROLLUP, progress);
                task.set_hours(&ROLLUP, estimated, actual);
                uow.stage_task(task.clone());
            }
        }
        cursor = task.parent;
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::{ChangeSet, Guarded};
    use crate::task::{LeafItem, NewLeafItem, NewTask, Task};

    // R(100) ─┬─ A(60)
    //         └─ B(40) ── item(100)
    fn tree() -> Database {
        let mut db = Database::default();
        let sub = |id: TaskId, w: u32, h: f64| {
            let draft = NewTask {
                parent: Some(1),
                estimated_hours: Some(h),
                ..NewTask::new(format!("t{id}"), w)
            };
            Guarded { row: Task::new(id, &draft, 1, 1, 0), expected: None }
        };
        let mut root = Task::new(1, &NewTask::new("R", 100), 1, 0, 0);
        root.set_leaf(&ROLLUP, false);
        db.save_atomic(ChangeSet {
            tasks: vec![Guarded { row: root, expected: None }, sub(2, 60, 3.0), sub(3, 40, 5.0)],
            ..ChangeSet::default()
        })
        .unwrap();
        db
    }

    #[test]
    fn test_weighted_progress_zero_weight() {
        assert_eq!(weighted_progress(&Children::default()), 0.0);
    }

    #[test]
    fn test_roll_up_matches_weighted_average() {
        let db = tree();
        let mut uow = UnitOfWork::new(&db);
        set_leaf_progress(&mut uow, 2, 50.0).unwrap();
        set_leaf_progress(&mut uow, 3, 25.0).unwrap();
        let root = uow.task(1).unwrap();
        assert_eq!(root.progress(), 40.0);
        assert_eq!(root.estimated_hours(), 8.0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let db = tree();
        let mut uow = UnitOfWork::new(&db);
        set_leaf_progress(&mut uow, 2, 33.3).unwrap();
        recompute_progress(&mut uow, 1).unwrap();
        let first = uow.task(1).unwrap().progress();
        recompute_progress(&mut uow, 1).unwrap();
        assert_eq!(uow.task(1).unwrap().progress(), first);
    }

    #[test]
    fn test_leaf_items_count_like_subtasks() {
        let db = tree();
        let mut uow = UnitOfWork::new(&db);
        let draft = NewLeafItem { title: "write doc".into(), weight: 100, due: None };
        let item = LeafItem::new(1, 3, &draft, 0);
        uow.stage_leaf_item(item);
        set_item_progress(&mut uow, 1, 50.0).unwrap();
        assert_eq!(uow.task(3).unwrap().progress(), 50.0);
        assert_eq!(uow.task(1).unwrap().progress(), 20.0);
        assert_eq!(
            recompute_progress(&mut uow, 3).unwrap(),
            vec![3, 1]
        );
    }

    #[test]
    fn test_out_of_range_progress_is_rejected() {
        let db = tree();
        let mut uow = UnitOfWork::new(&db);
        for bad in [-1.0, 100.5, f64::NAN] {
            assert!(matches!(
                set_leaf_progress(&mut uow, 2, bad),
                Err(EngineError::Validation { field: "progress", .. })
            ));
        }
    }
}
