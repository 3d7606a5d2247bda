//! Cascading assignment and deletion.
//!
//! Assignment fans out over the whole subtree: every task is handed to the same member
//! and, when the assigned task is flagged auto-todo, gets a companion leaf item. Deletion
//! removes the subtree depth-first, children before parents.

use crate::engine::{task_notice, Engine};
use crate::error::Result;
use crate::fields::{Entity, TaskStatus};
use crate::membership;
use crate::notify::{Notification, NotificationSink};
use crate::rollup;
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{LeafItem, NewLeafItem, Task, TaskId};
use crate::tree;

/// Attach a companion leaf item mirroring `task`, unless it already has one. The new item
/// is not rolled up here; the next weight or progress update accounts for it.
fn ensure_companion<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    outbox: &mut Vec<Notification>,
    task: &Task,
) {
    if uow.items_of(task.id).iter().any(|i| i.companion) {
        return;
    }
    let draft = NewLeafItem {
        title: task.title.clone(),
        weight: task.weight(),
        due: task.due,
    };
    let id = uow.allocate_leaf_item_id();
    let mut item = LeafItem::new(id, task.id, &draft, uow.now_utc());
    item.companion = true;
    if let (Some(member), Some(due)) = (task.assigned_member.as_deref(), item.due) {
        outbox.push(Notification::new(
            member,
            "Action item due",
            format!("Action item {} '{}' is due on {due}", item.id, item.title),
            Entity::LeafItem,
            item.id,
        ));
    }
    uow.stage_leaf_item(item);
}

impl<S: TaskStore, N: NotificationSink + ?Sized> Engine<'_, S, N> {
    /// Assign `id` and every task below it to `member` (`None` or blank unassigns).
    ///
    /// Subtasks are reassigned even when they already belong to someone else. Tasks whose
    /// assignee changes go back to `Pending`; the new assignee and the previous one are
    /// each notified.
    pub fn assign_task(&mut self, id: TaskId, member: Option<&str>, assigner: &str) -> Result<()> {
        let touched = self.transact(|uow, _, outbox| {
            let root = uow.require_task(id)?;
            let project = membership::task_project(uow, &root)?;
            membership::require_member(uow, assigner, project)?;
            let assignee = membership::validate_assignee(uow, member, root.assignment_id)?;

            let mut touched = 0;
            for mut task in tree::subtree_breadth_first(uow, id) {
                let previous = task.assigned_member.clone();
                if previous != assignee {
                    task.assigned_member = assignee.clone();
                    task.assigned_by = Some(assigner.to_string());
                    task.status = TaskStatus::Pending;
                    task.rejection_reason = None;
                    if let Some(new) = assignee.as_deref() {
                        outbox.push(task_notice(
                            new,
                            "Task assigned",
                            &task,
                            format!("{assigner} assigned task {} '{}' to you", task.id, task.title),
                        ));
                    }
                    if let Some(old) = previous.as_deref() {
                        outbox.push(task_notice(
                            old,
                            "Task reassigned",
                            &task,
                            format!(
                                "Task {} '{}' is no longer assigned to you",
                                task.id, task.title
                            ),
                        ));
                    }
                    uow.stage_task(task.clone());
                    touched += 1;
                }
                if root.auto_todo && assignee.is_some() {
                    ensure_companion(uow, outbox, &task);
                }
            }
            Ok(touched)
        })?;
        tracing::info!(task = id, member = ?member, assigner, touched, "task assigned");
        Ok(())
    }

    /// Delete a task with its whole subtree and all their leaf items. Returns `false` if
    /// the task does not exist.
    pub fn delete_task(&mut self, id: TaskId) -> Result<bool> {
        let deleted = self.transact(|uow, _, outbox| {
            let Some(task) = uow.task(id) else {
                return Ok(0);
            };
            let victims = tree::subtree_post_order(uow, id);
            for victim in &victims {
                for item in uow.items_of(*victim) {
                    uow.delete_leaf_item(item.id);
                }
                uow.delete_task(*victim);
            }
            if let Some(member) = task.assigned_member.as_deref() {
                outbox.push(task_notice(
                    member,
                    "Task deleted",
                    &task,
                    format!("Task {} '{}' was deleted", task.id, task.title),
                ));
            }
            if let Some(parent) = task.parent {
                rollup::refresh_from(uow, parent)?;
            }
            Ok(victims.len())
        })?;
        if deleted == 0 {
            tracing::debug!(task = id, "delete of unknown task ignored");
            return Ok(false);
        }
        tracing::info!(task = id, deleted, "task subtree deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit::World;
    use crate::error::EngineError;
    use crate::task::{NewTask, TaskPatch};
    use chrono::NaiveDate;

    #[test]
    fn test_assign_cascades_over_subtree() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 50)).unwrap().id;
        let a1 = engine.add_subtask(a, NewTask::new("A.1", 30)).unwrap().id;
        engine.assign_task(a1, Some("bo"), "lead").unwrap();

        engine.assign_task(r, Some("ana"), "lead").unwrap();
        for id in [r, a, a1] {
            let task = engine.get_task(id).unwrap().task;
            assert_eq!(task.assigned_member.as_deref(), Some("ana"));
            assert_eq!(task.assigned_by.as_deref(), Some("lead"));
            assert_eq!(task.status, TaskStatus::Pending);
        }
        drop(engine);
        assert_eq!(w.sink.sent_to("ana").len(), 3);
        let bo: Vec<String> = w.sink.sent_to("bo").into_iter().map(|n| n.subject).collect();
        assert_eq!(bo, vec!["Task assigned", "Task reassigned"]);
    }

    #[test]
    fn test_assign_to_outsider_changes_nothing() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        engine.assign_task(r, Some("ana"), "lead").unwrap();

        let err = engine.assign_task(r, Some("gus"), "lead").unwrap_err();
        assert!(matches!(err, EngineError::NotAMember { .. }));
        assert!(matches!(
            engine.assign_task(r, Some("bo"), "gus"),
            Err(EngineError::NotAMember { .. })
        ));
        let task = engine.get_task(r).unwrap().task;
        assert_eq!(task.assigned_member.as_deref(), Some("ana"));
    }

    #[test]
    fn test_unassign_notifies_previous_only() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        engine.assign_task(r, Some("ana"), "lead").unwrap();
        engine.assign_task(r, Some(" "), "lead").unwrap();
        assert_eq!(engine.get_task(r).unwrap().task.assigned_member, None);
        drop(engine);
        let subjects: Vec<String> = w.sink.sent().into_iter().map(|n| n.subject).collect();
        assert_eq!(subjects, vec!["Task assigned", "Task reassigned"]);
    }

    #[test]
    fn test_auto_todo_creates_one_companion_per_task() {
        let mut w = World::new();
        let mut draft = w.root("Launch", 100);
        draft.auto_todo = true;
        draft.due = NaiveDate::from_ymd_opt(2030, 3, 1);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 40)).unwrap().id;

        engine.assign_task(r, Some("ana"), "lead").unwrap();
        engine.assign_task(r, Some("bo"), "lead").unwrap();

        let tree = engine.get_task(r).unwrap();
        assert_eq!(tree.items.len(), 1);
        assert!(tree.items[0].companion);
        assert_eq!(tree.items[0].weight(), 40);
        assert_eq!(tree.items[0].due, NaiveDate::from_ymd_opt(2030, 3, 1));
        let sub = &tree.subtasks[0];
        assert_eq!(sub.task.id, a);
        assert_eq!(sub.items.len(), 1);
        assert_eq!(sub.items[0].title, "A");
        drop(engine);
        assert_eq!(
            w.sink.sent_to("ana").iter().filter(|n| n.subject == "Action item due").count(),
            1
        );
    }

    #[test]
    fn test_no_companion_without_flag() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        engine.assign_task(r, Some("ana"), "lead").unwrap();
        assert!(engine.get_task(r).unwrap().items.is_empty());
        engine
            .update_task(r, TaskPatch { auto_todo: Some(true), ..TaskPatch::default() }, true)
            .unwrap();
        engine.assign_task(r, Some("ana"), "lead").unwrap();
        assert_eq!(engine.get_task(r).unwrap().items.len(), 1);
    }

    #[test]
    fn test_cascade_delete_removes_every_descendant() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 50)).unwrap().id;
        let b = engine.add_subtask(r, NewTask::new("B", 50)).unwrap().id;
        let a1 = engine.add_subtask(a, NewTask::new("A.1", 50)).unwrap().id;
        let a2 = engine.add_subtask(a, NewTask::new("A.2", 50)).unwrap().id;
        engine
            .update_task(r, TaskPatch { auto_todo: Some(true), ..TaskPatch::default() }, true)
            .unwrap();
        engine.assign_task(r, Some("ana"), "lead").unwrap();

        assert!(engine.delete_task(r).unwrap());
        for id in [r, a, b, a1, a2] {
            assert!(matches!(engine.get_task(id), Err(EngineError::NotFound { .. })));
        }
        assert!(!engine.delete_task(r).unwrap());
        drop(engine);
        assert!(w.db.tasks.is_empty());
        assert!(w.db.leaf_items.is_empty());
        assert_eq!(w.sink.sent_to("ana").iter().filter(|n| n.subject == "Task deleted").count(), 1);
    }

    #[test]
    fn test_delete_subtask_refreshes_parent() {
        let mut w = World::new();
        let draft = w.root("Launch", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 60)).unwrap().id;
        let b = engine.add_subtask(r, NewTask::new("B", 40)).unwrap().id;
        engine.assign_task(a, Some("ana"), "lead").unwrap();
        engine.accept_task(a, "ana").unwrap();
        engine.update_progress(a, "ana", 80.0).unwrap();
        assert_eq!(engine.get_task(r).unwrap().task.progress(), 48.0);

        assert!(engine.delete_task(b).unwrap());
        let root = engine.get_task(r).unwrap().task;
        assert_eq!(root.weight(), 60);
        assert_eq!(root.progress(), 80.0);

        assert!(engine.delete_task(a).unwrap());
        assert!(engine.get_task(r).unwrap().task.is_leaf());
    }
}
