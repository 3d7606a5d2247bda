//! Leaf items: the checklist entries hanging off a task.
//!
//! Items share the owning task's weight budget with its subtasks and feed its progress
//! the same way. Only the task's assignee may accept, reject or report on them.

use crate::engine::{task_notice, Engine};
use crate::error::{EngineError, Result};
use crate::fields::{Entity, ItemStatus};
use crate::lifecycle::{require_reason, tell_assigner};
use crate::notify::NotificationSink;
use crate::rollup::{self, progress, weight};
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{LeafItem, LeafItemId, NewLeafItem, Task, TaskId};

fn item_transition_error(
    item: &LeafItem,
    action: &'static str,
    required: &'static str,
) -> EngineError {
    EngineError::InvalidStateTransition {
        entity: Entity::LeafItem,
        id: item.id,
        action,
        current: item.status.to_string(),
        required,
    }
}

/// Load an item with its owning task and check that `actor` is that task's assignee.
fn owned_item<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    item_id: LeafItemId,
    actor: &str,
) -> Result<(LeafItem, Task)> {
    let item = uow.require_leaf_item(item_id)?;
    let task = uow.task(item.task_id).ok_or_else(|| {
        EngineError::InconsistentHierarchy(format!(
            "leaf item {item_id} belongs to missing task {}",
            item.task_id
        ))
    })?;
    if !task.is_assigned_to(actor) {
        return Err(EngineError::NotAssigned {
            task: task.id,
            actor: actor.to_string(),
        });
    }
    Ok((item, task))
}

impl<S: TaskStore, N: NotificationSink + ?Sized> Engine<'_, S, N> {
    /// Attach a leaf item to a task. The item's weight counts against the task's budget.
    pub fn add_leaf_item(&mut self, task_id: TaskId, draft: NewLeafItem) -> Result<LeafItem> {
        let id = self.transact(|uow, _, outbox| {
            if draft.title.trim().is_empty() {
                return Err(EngineError::validation("title", "title cannot be empty"));
            }
            let task = uow.require_task(task_id)?;
            let w = weight::validate_weight(i64::from(draft.weight))?;
            weight::assert_creatable(uow, task_id, w)?;

            let id = uow.allocate_leaf_item_id();
            let draft = NewLeafItem {
                title: draft.title.trim().to_string(),
                weight: w,
                ..draft
            };
            let item = LeafItem::new(id, task_id, &draft, uow.now_utc());
            if let Some(member) = task.assigned_member.as_deref() {
                let due = item.due.map_or_else(String::new, |d| format!(", due {d}"));
                outbox.push(task_notice(
                    member,
                    "Action item added",
                    &task,
                    format!(
                        "Action item {} '{}' was added to task {}{due}",
                        item.id, item.title, task.id
                    ),
                ));
            }
            uow.stage_leaf_item(item);
            rollup::refresh_from(uow, task_id)?;
            Ok(id)
        })?;
        tracing::info!(task = task_id, item = id, "leaf item added");
        self.reload_item(id)
    }

    /// The task's assignee takes on a pending or previously rejected item.
    pub fn accept_leaf_item(&mut self, item_id: LeafItemId, member: &str) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let (mut item, task) = owned_item(uow, item_id, member)?;
            if !matches!(item.status, ItemStatus::Pending | ItemStatus::Rejected) {
                return Err(item_transition_error(&item, "accept", "Pending or Rejected"));
            }
            item.status = ItemStatus::Accepted;
            item.rejection_reason = None;
            tell_assigner(
                outbox,
                &task,
                member,
                "Action item accepted",
                format!("{member} accepted action item {} '{}'", item.id, item.title),
            );
            uow.stage_leaf_item(item);
            Ok(())
        })?;
        tracing::info!(item = item_id, member, "leaf item accepted");
        Ok(())
    }

    /// The task's assignee declines an item. A reason is required.
    pub fn reject_leaf_item(
        &mut self,
        item_id: LeafItemId,
        member: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let (mut item, task) = owned_item(uow, item_id, member)?;
            let reason = require_reason(reason)?;
            if !matches!(item.status, ItemStatus::Pending | ItemStatus::Accepted) {
                return Err(item_transition_error(&item, "reject", "Pending or Accepted"));
            }
            item.status = ItemStatus::Rejected;
            tell_assigner(
                outbox,
                &task,
                member,
                "Action item rejected",
                format!("{member} rejected action item {} '{}': {reason}", item.id, item.title),
            );
            item.rejection_reason = Some(reason);
            uow.stage_leaf_item(item);
            Ok(())
        })?;
        tracing::info!(item = item_id, member, "leaf item rejected");
        Ok(())
    }

    /// Report progress on an accepted item; it rolls up through the owning task.
    pub fn update_leaf_item_progress(
        &mut self,
        item_id: LeafItemId,
        member: &str,
        value: f64,
    ) -> Result<()> {
        self.transact(|uow, _, _| {
            let (item, _) = owned_item(uow, item_id, member)?;
            if item.status != ItemStatus::Accepted {
                return Err(item_transition_error(&item, "report progress on", "Accepted"));
            }
            progress::set_item_progress(uow, item_id, value)
        })?;
        tracing::info!(item = item_id, member, value, "leaf item progress reported");
        Ok(())
    }

    /// Remove an item and refresh its task. Returns `false` if the item does not exist.
    pub fn delete_leaf_item(&mut self, item_id: LeafItemId) -> Result<bool> {
        let removed = self.transact(|uow, _, _| {
            let Some(item) = uow.leaf_item(item_id) else {
                return Ok(false);
            };
            uow.delete_leaf_item(item_id);
            if uow.task(item.task_id).is_some() {
                rollup::refresh_from(uow, item.task_id)?;
            }
            Ok(true)
        })?;
        if removed {
            tracing::info!(item = item_id, "leaf item deleted");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit::World;
    use crate::task::NewTask;

    fn item(title: &str, weight: u32) -> NewLeafItem {
        NewLeafItem {
            title: title.into(),
            weight,
            due: None,
        }
    }

    /// Root R(100) with leaf subtask A(50) assigned to ana.
    fn setup(w: &mut World) -> (TaskId, TaskId) {
        let draft = w.root("R", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 50)).unwrap().id;
        engine.assign_task(a, Some("ana"), "lead").unwrap();
        (r, a)
    }

    #[test]
    fn test_items_share_budget_and_drive_progress() {
        let mut w = World::new();
        let (r, a) = setup(&mut w);
        let mut engine = w.engine();
        let first = engine.add_leaf_item(a, item("draft", 60)).unwrap();
        let second = engine.add_leaf_item(a, item("review", 40)).unwrap();
        assert!(matches!(
            engine.add_leaf_item(a, item("extra", 1)),
            Err(EngineError::BudgetExceeded { committed: 100, requested: 1, .. })
        ));

        engine.accept_leaf_item(first.id, "ana").unwrap();
        engine.update_leaf_item_progress(first.id, "ana", 50.0).unwrap();
        let a_task = engine.get_task(a).unwrap().task;
        assert_eq!(a_task.weight(), 100);
        assert_eq!(a_task.progress(), 30.0);
        assert!(a_task.is_leaf());
        assert_eq!(engine.get_task(r).unwrap().task.progress(), 30.0);

        assert!(engine.delete_leaf_item(second.id).unwrap());
        assert_eq!(engine.get_task(a).unwrap().task.progress(), 50.0);
        assert!(!engine.delete_leaf_item(second.id).unwrap());
        drop(engine);
        let added = w.sink.sent_to("ana");
        assert_eq!(added.iter().filter(|n| n.subject == "Action item added").count(), 2);
    }

    #[test]
    fn test_only_assignee_handles_items() {
        let mut w = World::new();
        let (_, a) = setup(&mut w);
        let mut engine = w.engine();
        let it = engine.add_leaf_item(a, item("draft", 20)).unwrap();
        assert!(matches!(
            engine.accept_leaf_item(it.id, "bo"),
            Err(EngineError::NotAssigned { actor, .. }) if actor == "bo"
        ));
        assert!(matches!(
            engine.accept_leaf_item(404, "ana"),
            Err(EngineError::NotFound { entity: Entity::LeafItem, .. })
        ));
    }

    #[test]
    fn test_item_state_machine() {
        let mut w = World::new();
        let (_, a) = setup(&mut w);
        let mut engine = w.engine();
        let it = engine.add_leaf_item(a, item("draft", 20)).unwrap().id;

        assert!(matches!(
            engine.update_leaf_item_progress(it, "ana", 10.0),
            Err(EngineError::InvalidStateTransition {
                entity: Entity::LeafItem,
                required: "Accepted",
                ..
            })
        ));
        assert!(matches!(
            engine.reject_leaf_item(it, "ana", None),
            Err(EngineError::Validation { field: "reason", .. })
        ));
        engine.reject_leaf_item(it, "ana", Some("out of scope")).unwrap();
        assert!(matches!(
            engine.reject_leaf_item(it, "ana", Some("again")),
            Err(EngineError::InvalidStateTransition { required: "Pending or Accepted", .. })
        ));
        engine.accept_leaf_item(it, "ana").unwrap();
        assert!(matches!(
            engine.accept_leaf_item(it, "ana"),
            Err(EngineError::InvalidStateTransition { required: "Pending or Rejected", .. })
        ));
        let stored = engine.get_task(a).unwrap().items.remove(0);
        assert_eq!(stored.status, ItemStatus::Accepted);
        assert_eq!(stored.rejection_reason, None);
        drop(engine);
        let subjects: Vec<String> = w.sink.sent_to("lead").into_iter().map(|n| n.subject).collect();
        assert_eq!(subjects, vec!["Action item rejected", "Action item accepted"]);
    }

    #[test]
    fn test_invalid_item_input() {
        let mut w = World::new();
        let (_, a) = setup(&mut w);
        let mut engine = w.engine();
        assert!(matches!(
            engine.add_leaf_item(a, item(" ", 10)),
            Err(EngineError::Validation { field: "title", .. })
        ));
        assert!(matches!(
            engine.add_leaf_item(a, item("zero", 0)),
            Err(EngineError::InvalidWeight { weight: 0 })
        ));
        assert!(matches!(
            engine.add_leaf_item(999, item("lost", 10)),
            Err(EngineError::NotFound { entity: Entity::Task, .. })
        ));
        let it = engine.add_leaf_item(a, item("draft", 10)).unwrap().id;
        engine.accept_leaf_item(it, "ana").unwrap();
        assert!(matches!(
            engine.update_leaf_item_progress(it, "ana", 140.0),
            Err(EngineError::Validation { field: "progress", .. })
        ));
    }
}
