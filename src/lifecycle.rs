//! Task lifecycle state machine.
//!
//! Leaf tasks are accepted or rejected by their assignee and report progress once
//! accepted. Any task whose progress reaches 100 can be submitted for review, and a
//! reviewer (team lead or scrum master) then accepts or rejects the completion.

use crate::engine::{task_notice, Engine};
use crate::error::{EngineError, Result};
use crate::fields::{Entity, TaskStatus};
use crate::membership;
use crate::notify::{Notification, NotificationSink};
use crate::rollup::progress;
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{Task, TaskId};

/// Moves a task can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accept,
    Reject,
    SubmitForReview,
    AcceptCompletion,
    RejectCompletion,
}

impl Transition {
    pub fn verb(self) -> &'static str {
        match self {
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::SubmitForReview => "submit for review",
            Transition::AcceptCompletion => "accept completion of",
            Transition::RejectCompletion => "reject completion of",
        }
    }

    /// Human-readable source states the transition requires.
    fn requires(self, is_leaf: bool) -> &'static str {
        match (self, is_leaf) {
            (Transition::Accept, _) => "Pending or Rejected",
            (Transition::Reject, _) => "Pending or Accepted",
            (Transition::SubmitForReview, true) => "Accepted",
            (Transition::SubmitForReview, false) => "Pending or InProgress",
            (Transition::AcceptCompletion | Transition::RejectCompletion, _) => "WaitingForReview",
        }
    }
}

/// Target state of `transition` from `from`, or `None` if the move is illegal.
pub fn next_status(from: TaskStatus, is_leaf: bool, transition: Transition) -> Option<TaskStatus> {
    use TaskStatus::*;
    match (transition, from, is_leaf) {
        (Transition::Accept, Pending | Rejected, true) => Some(Accepted),
        (Transition::Reject, Pending | Accepted, true) => Some(Rejected),
        (Transition::SubmitForReview, Accepted, true) => Some(WaitingForReview),
        (Transition::SubmitForReview, Pending | InProgress, false) => Some(WaitingForReview),
        (Transition::AcceptCompletion, WaitingForReview, _) => Some(Completed),
        // Leaf tasks have no InProgress state; rejected work goes back to Accepted.
        (Transition::RejectCompletion, WaitingForReview, true) => Some(Accepted),
        (Transition::RejectCompletion, WaitingForReview, false) => Some(InProgress),
        _ => None,
    }
}

/// Transitions available from `from`.
pub fn allowed_transitions(from: TaskStatus, is_leaf: bool) -> Vec<Transition> {
    [
        Transition::Accept,
        Transition::Reject,
        Transition::SubmitForReview,
        Transition::AcceptCompletion,
        Transition::RejectCompletion,
    ]
    .into_iter()
    .filter(|t| next_status(from, is_leaf, *t).is_some())
    .collect()
}

fn advance(task: &mut Task, transition: Transition) -> Result<()> {
    let is_leaf = task.is_leaf();
    match next_status(task.status, is_leaf, transition) {
        Some(next) => {
            task.status = next;
            Ok(())
        }
        None => Err(EngineError::InvalidStateTransition {
            entity: Entity::Task,
            id: task.id,
            action: transition.verb(),
            current: task.status.to_string(),
            required: transition.requires(is_leaf),
        }),
    }
}

pub(crate) fn require_reason(reason: Option<&str>) -> Result<String> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(EngineError::validation("reason", "a reason is required")),
    }
}

fn require_leaf(task: &Task, action: &'static str) -> Result<()> {
    if task.is_leaf() {
        Ok(())
    } else {
        Err(EngineError::NotALeaf { task: task.id, action })
    }
}

fn require_assignee(task: &Task, actor: &str) -> Result<()> {
    if task.is_assigned_to(actor) {
        Ok(())
    } else {
        Err(EngineError::NotAssigned {
            task: task.id,
            actor: actor.to_string(),
        })
    }
}

/// Reviewer must sit on the task's project with a reviewing role.
fn require_reviewer<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    task: &Task,
    reviewer: &str,
) -> Result<()> {
    let project = membership::task_project(uow, task)?;
    let seat = membership::require_member(uow, reviewer, project)?;
    if !seat.role.can_review() {
        return Err(EngineError::NotAuthorized {
            action: format!("review task {} as {}", task.id, seat.role),
        });
    }
    Ok(())
}

/// Notice for whoever handed the task to `actor`. Falls back to the assignee when the
/// actor assigned the task to themselves, so a status change always reaches someone.
pub(crate) fn tell_assigner(
    outbox: &mut Vec<Notification>,
    task: &Task,
    actor: &str,
    subject: &str,
    body: String,
) {
    let recipient = task
        .assigned_by
        .as_deref()
        .filter(|a| *a != actor)
        .or(task.assigned_member.as_deref());
    if let Some(recipient) = recipient {
        outbox.push(task_notice(recipient, subject, task, body));
    }
}

/// Notice for the assignee, or for the assigner of an unassigned task.
fn tell_assignee(outbox: &mut Vec<Notification>, task: &Task, subject: &str, body: String) {
    let recipient = task
        .assigned_member
        .as_deref()
        .or(task.assigned_by.as_deref());
    if let Some(recipient) = recipient {
        outbox.push(task_notice(recipient, subject, task, body));
    }
}

impl<S: TaskStore, N: NotificationSink + ?Sized> Engine<'_, S, N> {
    /// The assignee confirms a leaf task.
    pub fn accept_task(&mut self, id: TaskId, member: &str) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let mut task = uow.require_task(id)?;
            require_assignee(&task, member)?;
            require_leaf(&task, "accept")?;
            advance(&mut task, Transition::Accept)?;
            task.rejection_reason = None;
            tell_assigner(
                outbox,
                &task,
                member,
                "Task accepted",
                format!("{member} accepted task {} '{}'", task.id, task.title),
            );
            uow.stage_task(task);
            Ok(())
        })?;
        tracing::info!(task = id, member, "task accepted");
        Ok(())
    }

    /// The assignee declines a leaf task. A reason is required.
    pub fn reject_task(&mut self, id: TaskId, member: &str, reason: Option<&str>) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let mut task = uow.require_task(id)?;
            require_assignee(&task, member)?;
            require_leaf(&task, "reject")?;
            let reason = require_reason(reason)?;
            advance(&mut task, Transition::Reject)?;
            tell_assigner(
                outbox,
                &task,
                member,
                "Task rejected",
                format!("{member} rejected task {} '{}': {reason}", task.id, task.title),
            );
            task.rejection_reason = Some(reason);
            uow.stage_task(task);
            Ok(())
        })?;
        tracing::info!(task = id, member, "task rejected");
        Ok(())
    }

    /// The assignee reports progress on an accepted leaf task; the value rolls up to the root.
    pub fn update_progress(&mut self, id: TaskId, member: &str, value: f64) -> Result<()> {
        self.transact(|uow, _, _| {
            let task = uow.require_task(id)?;
            require_assignee(&task, member)?;
            require_leaf(&task, "progress reporting")?;
            if task.status != TaskStatus::Accepted {
                return Err(EngineError::InvalidStateTransition {
                    entity: Entity::Task,
                    id,
                    action: "report progress on",
                    current: task.status.to_string(),
                    required: "Accepted",
                });
            }
            let items = uow.items_of(id);
            if !items.is_empty() {
                return Err(EngineError::validation(
                    "progress",
                    format!("progress of task {id} is derived from its {} leaf items", items.len()),
                ));
            }
            progress::set_leaf_progress(uow, id, value)
        })?;
        tracing::info!(task = id, member, value, "progress reported");
        Ok(())
    }

    /// Hand a finished task (progress 100) to the project's reviewers.
    pub fn submit_for_review(&mut self, id: TaskId, member: &str) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let mut task = uow.require_task(id)?;
            let project = membership::task_project(uow, &task)?;
            if task.assigned_member.is_some() {
                require_assignee(&task, member)?;
            } else {
                membership::require_member(uow, member, project)?;
            }
            advance(&mut task, Transition::SubmitForReview)?;
            if task.progress() < 100.0 {
                return Err(EngineError::validation(
                    "progress",
                    format!("task {id} is at {:.1}%, not 100%", task.progress()),
                ));
            }
            let body = format!("{member} submitted task {} '{}' for review", task.id, task.title);
            let reviewers: Vec<_> = uow
                .assignments_by_project(project)
                .into_iter()
                .filter(|a| a.active && a.role.can_review() && a.member_id != member)
                .map(|a| a.member_id)
                .collect();
            if reviewers.is_empty() {
                outbox.push(task_notice(member, "Review requested", &task, body));
            } else {
                for reviewer in &reviewers {
                    outbox.push(task_notice(reviewer, "Review requested", &task, body.clone()));
                }
            }
            uow.stage_task(task);
            Ok(())
        })?;
        tracing::info!(task = id, member, "task submitted for review");
        Ok(())
    }

    /// A reviewer signs off a task waiting for review.
    pub fn accept_completion(&mut self, id: TaskId, reviewer: &str) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let mut task = uow.require_task(id)?;
            require_reviewer(uow, &task, reviewer)?;
            advance(&mut task, Transition::AcceptCompletion)?;
            task.rejection_reason = None;
            tell_assignee(
                outbox,
                &task,
                "Task completed",
                format!("{reviewer} accepted completion of task {} '{}'", task.id, task.title),
            );
            uow.stage_task(task);
            Ok(())
        })?;
        tracing::info!(task = id, reviewer, "completion accepted");
        Ok(())
    }

    /// A reviewer sends a task back. A reason is required and kept on the task.
    pub fn reject_completion(
        &mut self,
        id: TaskId,
        reviewer: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        self.transact(|uow, _, outbox| {
            let mut task = uow.require_task(id)?;
            require_reviewer(uow, &task, reviewer)?;
            let reason = require_reason(reason)?;
            advance(&mut task, Transition::RejectCompletion)?;
            tell_assignee(
                outbox,
                &task,
                "Completion rejected",
                format!("{reviewer} sent task {} '{}' back: {reason}", task.id, task.title),
            );
            task.rejection_reason = Some(reason);
            uow.stage_task(task);
            Ok(())
        })?;
        tracing::info!(task = id, reviewer, "completion rejected");
        Ok(())
    }
}
