//! The task engine facade.
//!
//! `Engine` borrows a store, a notification sink and the configuration for the duration of
//! one request. Each public operation validates first, stages its writes in a
//! [`UnitOfWork`], commits them with one atomic save and only then fires notifications.
//!
//! Lifecycle, cascade and leaf-item operations live in their own modules as further
//! `impl Engine` blocks.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fields::{Entity, NestingPolicy};
use crate::membership;
use crate::notify::{Notification, NotificationSink};
use crate::rollup::{self, weight};
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{LeafItem, LeafItemId, NewTask, Task, TaskId, TaskPatch, TaskTree};
use crate::tree;

pub struct Engine<'a, S: TaskStore, N: NotificationSink + ?Sized> {
    store: &'a mut S,
    sink: &'a N,
    config: &'a EngineConfig,
    undelivered: Vec<Notification>,
}

impl<'a, S: TaskStore, N: NotificationSink + ?Sized> Engine<'a, S, N> {
    pub fn new(store: &'a mut S, sink: &'a N, config: &'a EngineConfig) -> Self {
        Engine {
            store,
            sink,
            config,
            undelivered: Vec::new(),
        }
    }

    /// Notifications that could not be delivered since the last call.
    pub fn take_undelivered(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.undelivered)
    }

    /// Run `op` against a fresh unit of work, commit its changes atomically and dispatch
    /// the notifications it queued.
    pub(crate) fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut UnitOfWork<'_, S>, &EngineConfig, &mut Vec<Notification>) -> Result<T>,
    ) -> Result<T> {
        let mut outbox = Vec::new();
        let (value, changes) = {
            let mut uow = UnitOfWork::new(&*self.store);
            let value = op(&mut uow, self.config, &mut outbox)?;
            (value, uow.into_changes())
        };
        if !changes.is_empty() {
            self.store.save_atomic(changes)?;
        }
        self.dispatch(outbox);
        Ok(value)
    }

    fn dispatch(&mut self, outbox: Vec<Notification>) {
        for n in outbox {
            if let Err(e) = self.sink.notify(&n) {
                tracing::warn!(
                    recipient = %n.recipient,
                    entity_id = n.entity_id,
                    error = %e,
                    "notification delivery failed"
                );
                self.undelivered.push(n);
            }
        }
    }

    pub(crate) fn reload(&self, id: TaskId) -> Result<Task> {
        self.store
            .find_by_id(id)
            .ok_or_else(|| EngineError::not_found(Entity::Task, id))
    }

    pub(crate) fn reload_item(&self, id: LeafItemId) -> Result<LeafItem> {
        self.store
            .find_leaf_item(id)
            .ok_or_else(|| EngineError::not_found(Entity::LeafItem, id))
    }

    /// Create a root task, or a subtask when `draft.parent` is set.
    pub fn create_task(&mut self, draft: NewTask) -> Result<Task> {
        let id = self.transact(|uow, config, outbox| create(uow, config, outbox, draft))?;
        tracing::info!(task = id, "task created");
        self.reload(id)
    }

    pub fn add_subtask(&mut self, parent: TaskId, draft: NewTask) -> Result<Task> {
        self.create_task(NewTask {
            parent: Some(parent),
            ..draft
        })
    }

    /// Apply `patch` to a task. Only supervisors may touch dates, weight, estimates, the
    /// auto-todo flag or the parent.
    pub fn update_task(
        &mut self,
        id: TaskId,
        patch: TaskPatch,
        is_supervisor: bool,
    ) -> Result<Task> {
        if !is_supervisor && !patch.is_member_editable() {
            return Err(EngineError::NotAuthorized {
                action: format!("change scheduling, weight or structure of task {id}"),
            });
        }
        self.transact(|uow, config, outbox| update(uow, config, outbox, id, patch))?;
        tracing::info!(task = id, "task updated");
        self.reload(id)
    }

    /// A task with its full subtree and leaf items.
    pub fn get_task(&self, id: TaskId) -> Result<TaskTree> {
        let mut uow = UnitOfWork::new(&*self.store);
        let task = uow.require_task(id)?;
        Ok(build_tree(&mut uow, task))
    }

    /// Re-derive the leaf flag, weight and progress of a task and its ancestors from their
    /// current children. Repairs trees left stale by out-of-band edits.
    pub fn recompute_progress(&mut self, id: TaskId) -> Result<Task> {
        self.transact(|uow, _, _| {
            uow.require_task(id)?;
            rollup::refresh_from(uow, id)
        })?;
        self.reload(id)
    }
}

pub(crate) fn task_notice(
    recipient: &str,
    subject: &str,
    task: &Task,
    body: String,
) -> Notification {
    Notification::new(recipient, subject, body, Entity::Task, task.id)
}

fn check_dates(task: &Task) -> Result<()> {
    if let (Some(start), Some(due)) = (task.start_date, task.due) {
        if start > due {
            return Err(EngineError::validation(
                "due",
                format!("due date {due} precedes start date {start}"),
            ));
        }
    }
    Ok(())
}

fn check_hours(field: &'static str, hours: f64) -> Result<f64> {
    if hours.is_finite() && hours >= 0.0 {
        Ok(hours)
    } else {
        Err(EngineError::validation(
            field,
            format!("{hours} is not a non-negative number of hours"),
        ))
    }
}

fn create<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    config: &EngineConfig,
    outbox: &mut Vec<Notification>,
    draft: NewTask,
) -> Result<TaskId> {
    if draft.title.trim().is_empty() {
        return Err(EngineError::validation("title", "title cannot be empty"));
    }
    let weight = weight::validate_weight(i64::from(draft.weight))?;
    if let Some(hours) = draft.estimated_hours {
        check_hours("estimated_hours", hours)?;
    }

    let (assignment_id, depth) = match draft.parent {
        None => {
            let assignment = draft.assignment_id.ok_or_else(|| {
                EngineError::validation("assignment_id", "a root task needs an assignment")
            })?;
            membership::require_assignment(uow, assignment)?;
            (assignment, 0)
        }
        Some(parent_id) => {
            let assignment = match draft.assignment_id {
                Some(a) => a,
                None => uow
                    .task(parent_id)
                    .map(|p| p.assignment_id)
                    .ok_or_else(|| {
                        EngineError::InconsistentHierarchy(format!(
                            "parent task {parent_id} does not exist"
                        ))
                    })?,
            };
            let parent = membership::validate_parent(uow, assignment, parent_id)?;
            tree::check_nesting(config.nesting, &parent)?;
            weight::assert_creatable(uow, parent_id, weight)?;
            (assignment, parent.depth() + 1)
        }
    };
    let assignee = membership::validate_assignee(uow, draft.assignee.as_deref(), assignment_id)?;

    let id = uow.allocate_task_id();
    if let Some(parent_id) = draft.parent {
        tree::validate_acyclic(uow, id, parent_id)?;
    }
    let mut task = Task::new(id, &draft, assignment_id, depth, uow.now_utc());
    check_dates(&task)?;
    if let Some(member) = assignee {
        outbox.push(task_notice(
            &member,
            "Task assigned",
            &task,
            format!("Task {} '{}' was assigned to you", task.id, task.title),
        ));
        task.assigned_member = Some(member);
        task.assigned_by = uow.assignment(assignment_id).map(|seat| seat.member_id);
    }
    uow.stage_task(task);
    if let Some(parent_id) = draft.parent {
        rollup::refresh_from(uow, parent_id)?;
    }
    Ok(id)
}

fn update<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    config: &EngineConfig,
    outbox: &mut Vec<Notification>,
    id: TaskId,
    patch: TaskPatch,
) -> Result<()> {
    let mut task = uow.require_task(id)?;
    let has_subtasks = !uow.subtasks(id).is_empty();

    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(EngineError::validation("title", "title cannot be empty"));
        }
        task.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(start) = patch.start_date {
        task.start_date = start;
    }
    let old_due = task.due;
    if let Some(due) = patch.due {
        task.due = due;
    }
    check_dates(&task)?;
    for (field, value) in [
        ("estimated_hours", patch.estimated_hours),
        ("actual_hours", patch.actual_hours),
    ] {
        let Some(hours) = value else { continue };
        if has_subtasks {
            return Err(EngineError::validation(
                field,
                "hours of a task with subtasks are rolled up",
            ));
        }
        let hours = check_hours(field, hours)?;
        if field == "estimated_hours" {
            task.record_estimated_hours(hours);
        } else {
            task.record_actual_hours(hours);
        }
    }
    if let Some(auto_todo) = patch.auto_todo {
        task.auto_todo = auto_todo;
    }
    if task.due != old_due {
        if let Some(member) = task.assigned_member.clone() {
            let when = task.due.map_or_else(|| "no due date".to_string(), |d| d.to_string());
            outbox.push(task_notice(
                &member,
                "Due date changed",
                &task,
                format!("Task {} '{}' is now due: {when}", task.id, task.title),
            ));
        }
    }
    let hours_changed = patch.estimated_hours.is_some() || patch.actual_hours.is_some();
    let parent = task.parent;
    uow.stage_task(task);

    if let Some(w) = patch.weight {
        let w = weight::validate_weight(w)?;
        weight::set_weight(uow, id, w, config.strict_weight_budget)?;
        if let Some(parent) = parent {
            rollup::progress::recompute_progress(uow, parent)?;
        }
    } else if hours_changed {
        if let Some(parent) = parent {
            rollup::progress::recompute_progress(uow, parent)?;
        }
    }
    if let Some(new_parent) = patch.parent {
        reparent(uow, config, id, new_parent)?;
    }
    Ok(())
}

fn reparent<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    config: &EngineConfig,
    id: TaskId,
    new_parent: Option<TaskId>,
) -> Result<()> {
    let mut task = uow.require_task(id)?;
    let old_parent = task.parent;
    if old_parent == new_parent {
        return Ok(());
    }
    let depth = match new_parent {
        None => 0,
        Some(parent_id) => {
            let parent = membership::validate_parent(uow, task.assignment_id, parent_id)?;
            tree::validate_acyclic(uow, id, parent_id)?;
            tree::check_nesting(config.nesting, &parent)?;
            if config.nesting == NestingPolicy::SingleLevel && !uow.subtasks(id).is_empty() {
                return Err(EngineError::InconsistentHierarchy(format!(
                    "task {id} has subtasks and would nest them two levels deep"
                )));
            }
            if config.strict_weight_budget {
                weight::assert_creatable(uow, parent_id, task.weight())?;
            }
            parent.depth() + 1
        }
    };
    task.parent = new_parent;
    uow.stage_task(task);
    rollup::assign_depths(uow, id, depth);
    if let Some(old) = old_parent {
        rollup::refresh_from(uow, old)?;
    }
    if let Some(new) = new_parent {
        rollup::refresh_from(uow, new)?;
    }
    tracing::debug!(task = id, from = ?old_parent, to = ?new_parent, "task reparented");
    Ok(())
}

fn build_tree<S: TaskStore + ?Sized>(uow: &mut UnitOfWork<'_, S>, task: Task) -> TaskTree {
    let items = uow.items_of(task.id);
    let subtasks = uow
        .subtasks(task.id)
        .into_iter()
        .map(|sub| build_tree(uow, sub))
        .collect();
    TaskTree {
        task,
        items,
        subtasks,
    }
}
