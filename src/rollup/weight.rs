//! Weight budget ledger.
//!
//! Siblings share a 100-unit budget. The budget is checked when a child is created; the
//! upward recompute never re-validates it, so direct edits can leave a parent temporarily
//! over budget unless strict checking is enabled.

use super::ROLLUP;
use crate::error::{EngineError, Result};
use crate::store::{TaskStore, UnitOfWork};
use crate::task::TaskId;

pub const WEIGHT_BUDGET: u32 = 100;

/// Accept weights in `1..=100`.
pub fn validate_weight(weight: i64) -> Result<u32> {
    match u32::try_from(weight) {
        Ok(w) if (1..=WEIGHT_BUDGET).contains(&w) => Ok(w),
        _ => Err(EngineError::InvalidWeight { weight }),
    }
}

/// Fail with `BudgetExceeded` if a new child of `proposed` weight would push the children
/// of `parent_id` past the budget.
pub fn assert_creatable<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    parent_id: TaskId,
    proposed: u32,
) -> Result<()> {
    let committed = uow.children(parent_id).total_weight();
    if committed + proposed > WEIGHT_BUDGET {
        return Err(EngineError::BudgetExceeded {
            parent: parent_id,
            committed,
            requested: proposed,
        });
    }
    Ok(())
}

/// Like [`assert_creatable`], but for an existing subtask whose current weight is already
/// counted among the parent's children.
pub fn assert_resizable<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    parent_id: TaskId,
    task_id: TaskId,
    proposed: u32,
) -> Result<()> {
    let children = uow.children(parent_id);
    let committed = children.total_weight()
        - children
            .subtasks
            .iter()
            .filter(|t| t.id == task_id)
            .map(|t| t.weight())
            .sum::<u32>();
    if committed + proposed > WEIGHT_BUDGET {
        return Err(EngineError::BudgetExceeded {
            parent: parent_id,
            committed,
            requested: proposed,
        });
    }
    Ok(())
}

/// Edit the weight of a task whose weight is not derived (it has no children), then walk
/// the change up the ancestor chain.
pub fn set_weight<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    task_id: TaskId,
    weight: u32,
    strict: bool,
) -> Result<()> {
    let mut task = uow.require_task(task_id)?;
    if !uow.children(task_id).is_empty() {
        return Err(EngineError::validation(
            "weight",
            format!("weight of task {task_id} is derived from its children"),
        ));
    }
    if strict {
        if let Some(parent) = task.parent {
            assert_resizable(uow, parent, task_id, weight)?;
        }
    }
    task.set_weight(&ROLLUP, weight);
    let parent = task.parent;
    uow.stage_task(task);
    if let Some(parent) = parent {
        recompute_weight(uow, parent)?;
    }
    Ok(())
}

/// Recompute the weight of `start` and each of its ancestors from their direct children,
/// clamped to `0..=100`. Nodes without children keep their own weight.
pub fn recompute_weight<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    start: TaskId,
) -> Result<()> {
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
            let total = children.total_weight().min(WEIGHT_BUDGET);
            if task.weight() != total {
                tracing::debug!(task = id, from = task.weight(), to = total, "weight recomputed");
                task.set_weight(&ROLLUP, total);
                uow.stage_task(task.clone());
            }
        }
        cursor = task.parent;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::{ChangeSet, Guarded};
    use crate::task::{NewTask, Task};

    fn family(weights: &[u32]) -> Database {
        let mut db = Database::default();
        let root = Task::new(1, &NewTask::new("root", 100), 1, 0, 0);
        let mut rows = vec![Guarded { row: root, expected: None }];
        for (i, w) in weights.iter().enumerate() {
            let draft = NewTask { parent: Some(1), ..NewTask::new(format!("child {i}"), *w) };
            rows.push(Guarded { row: Task::new(i as TaskId + 2, &draft, 1, 1, 0), expected: None });
        }
        db.save_atomic(ChangeSet { tasks: rows, ..ChangeSet::default() }).unwrap();
        db
    }

    #[test]
    fn test_validate_weight_bounds() {
        assert_eq!(validate_weight(1).unwrap(), 1);
        assert_eq!(validate_weight(100).unwrap(), 100);
        for bad in [0, -5, 101] {
            assert!(matches!(
                validate_weight(bad),
                Err(EngineError::InvalidWeight { weight }) if weight == bad
            ));
        }
    }

    #[test]
    fn test_assert_creatable() {
        let db = family(&[70]);
        let mut uow = UnitOfWork::new(&db);
        assert!(assert_creatable(&mut uow, 1, 30).is_ok());
        assert!(matches!(
            assert_creatable(&mut uow, 1, 40),
            Err(EngineError::BudgetExceeded { parent: 1, committed: 70, requested: 40 })
        ));
    }

    #[test]
    fn test_recompute_weight_sums_children() {
        let db = family(&[30, 20]);
        let mut uow = UnitOfWork::new(&db);
        recompute_weight(&mut uow, 1).unwrap();
        assert_eq!(uow.task(1).unwrap().weight(), 50);
    }

    #[test]
    fn test_recompute_weight_clamps_and_skips_childless() {
        let db = family(&[70, 60]);
        let mut uow = UnitOfWork::new(&db);
        recompute_weight(&mut uow, 2).unwrap();
        assert_eq!(uow.task(2).unwrap().weight(), 70);
        assert_eq!(uow.task(1).unwrap().weight(), 100);
    }

    #[test]
    fn test_set_weight_strict_and_permissive() {
        let db = family(&[70, 20]);
        let mut uow = UnitOfWork::new(&db);
        assert!(matches!(
            set_weight(&mut uow, 3, 40, true),
            Err(EngineError::BudgetExceeded { committed: 70, requested: 40, .. })
        ));
        set_weight(&mut uow, 3, 40, false).unwrap();
        assert_eq!(uow.task(3).unwrap().weight(), 40);
        assert_eq!(uow.task(1).unwrap().weight(), 100);
        assert!(matches!(
            set_weight(&mut uow, 1, 10, false),
            Err(EngineError::Validation { field: "weight", .. })
        ));
    }
}
