//! Membership validation.
//!
//! Every task resolves to a project through its assignment. A subtask must resolve to its
//! parent's project, and an assignee must hold an active assignment on that project.

use crate::error::{EngineError, Result};
use crate::fields::Entity;
use crate::project::Assignment;
use crate::store::{TaskStore, UnitOfWork};
use crate::task::{AssignmentId, MemberId, ProjectId, Task, TaskId};

/// Project a task created under `assignment` belongs to.
pub fn project_of<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    assignment: AssignmentId,
) -> Option<ProjectId> {
    uow.assignment(assignment).map(|a| a.project_id)
}

/// Project of an existing task.
pub fn task_project<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    task: &Task,
) -> Result<ProjectId> {
    project_of(uow, task.assignment_id).ok_or_else(|| {
        EngineError::InconsistentHierarchy(format!(
            "task {} has no resolvable project (assignment {} is missing)",
            task.id, task.assignment_id
        ))
    })
}

/// The assignment a root task is created under. It must exist and be active.
pub fn require_assignment<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    id: AssignmentId,
) -> Result<Assignment> {
    let seat = uow
        .assignment(id)
        .ok_or_else(|| EngineError::not_found(Entity::Assignment, id))?;
    if !seat.active {
        return Err(EngineError::NotAMember {
            member: seat.member_id,
            project: seat.project_id,
        });
    }
    Ok(seat)
}

/// Check that `parent_id` exists and resolves to the same project as `child_assignment`.
/// Returns the parent.
pub fn validate_parent<S: TaskStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    child_assignment: AssignmentId,
    parent_id: TaskId,
) -> Result<Task> {
    let parent = uow.task(parent_id).ok_or_else(|| {
        EngineError::InconsistentHierarchy(format!("parent task {parent_id} does not exist"))
    })?;
    let parent_project = task_project(uow, &parent)?;
    let child_project = project_of(uow, child_assignment).ok_or_else(|| {
        EngineError::InconsistentHierarchy(format!(
            "assignment {child_assignment} resolves to no project"
        ))
    })?;
    if parent_project != child_project {
        return Err(EngineError::InconsistentHierarchy(format!(
            "parent task {parent_id} belongs to project {parent_project}, child to project {child_project}"
        )));
    }
    Ok(parent)
}

/// Active seat of `member` on `project`, if any.
pub fn active_seat<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    member: &str,
    project: ProjectId,
) -> Option<Assignment> {
    uow.assignments_by_project(project)
        .into_iter()
        .find(|a| a.active && a.member_id == member)
}

/// Check that `member` may be assigned work under `assignment`'s project.
///
/// A missing or blank member means "unassign" and is always valid; the normalised member
/// id is returned.
pub fn validate_assignee<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    member: Option<&str>,
    assignment: AssignmentId,
) -> Result<Option<MemberId>> {
    let member = match member.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(m) => m,
    };
    let project = project_of(uow, assignment).ok_or_else(|| {
        EngineError::InconsistentHierarchy(format!(
            "assignment {assignment} resolves to no project"
        ))
    })?;
    if active_seat(uow, member, project).is_none() {
        return Err(EngineError::NotAMember {
            member: member.to_string(),
            project,
        });
    }
    Ok(Some(member.to_string()))
}

/// Check that `member` is seated on `project`.
pub fn require_member<S: TaskStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    member: &str,
    project: ProjectId,
) -> Result<Assignment> {
    active_seat(uow, member, project).ok_or_else(|| EngineError::NotAMember {
        member: member.to_string(),
        project,
    })
}
