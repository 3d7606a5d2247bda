//! Projects and the membership roster.
//!
//! A project is owned by a department and carries a roster of assignments. An assignment
//! binds one member to one project with a role, and at most one assignment per
//! (project, member) pair is active at a time. Task membership checks resolve against it.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::StoreError;
use crate::fields::Role;
use crate::task::{AssignmentId, MemberId, ProjectId};

/// A department-owned initiative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub key: String,
    pub department: Option<String>,
    pub created_at_utc: i64,
}

/// A member's seat on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub project_id: ProjectId,
    pub member_id: MemberId,
    pub role: Role,
    pub active: bool,
}

/// Derive a short lookup key from a display name: lowercase, underscores between words.
pub fn project_key(display_name: &str) -> String {
    display_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl Database {
    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Look a project up by id or key.
    pub fn resolve_project(&self, identifier: &str) -> Result<ProjectId, String> {
        if let Ok(id) = identifier.parse::<ProjectId>() {
            return self
                .project(id)
                .map(|p| p.id)
                .ok_or_else(|| format!("Project with ID {id} not found"));
        }
        let key = project_key(identifier);
        self.projects
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.id)
            .ok_or_else(|| format!("No project found with name '{identifier}'"))
    }

    pub fn add_project(
        &mut self,
        name: &str,
        department: Option<String>,
        now_utc: i64,
    ) -> Result<&Project, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Roster("project name cannot be empty".into()));
        }
        let key = project_key(name);
        if self.projects.iter().any(|p| p.key == key) {
            return Err(StoreError::Roster(format!("project '{name}' already exists")));
        }
        let id = self.projects.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        self.projects.push(Project {
            id,
            name: name.trim().to_string(),
            key,
            department,
            created_at_utc: now_utc,
        });
        tracing::info!(project = id, "project created");
        Ok(&self.projects[self.projects.len() - 1])
    }

    /// Seat `member` on `project`. Fails if the member already holds an active seat.
    pub fn add_member(
        &mut self,
        project: ProjectId,
        member: &str,
        role: Role,
    ) -> Result<&Assignment, StoreError> {
        let member = member.trim();
        if member.is_empty() {
            return Err(StoreError::Roster("member id cannot be blank".into()));
        }
        if self.project(project).is_none() {
            return Err(StoreError::Roster(format!("project {project} not found")));
        }
        if self
            .assignments
            .iter()
            .any(|a| a.active && a.project_id == project && a.member_id == member)
        {
            return Err(StoreError::Roster(format!(
                "'{member}' already holds an active assignment on project {project}"
            )));
        }
        let id = self.assignments.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        self.assignments.push(Assignment {
            id,
            project_id: project,
            member_id: member.to_string(),
            role,
            active: true,
        });
        tracing::info!(project, member, %role, assignment = id, "member added");
        Ok(&self.assignments[self.assignments.len() - 1])
    }

    /// Deactivate the member's seat. Tasks already assigned to them are left alone.
    pub fn remove_member(&mut self, project: ProjectId, member: &str) -> Result<(), StoreError> {
        let seat = self
            .assignments
            .iter_mut()
            .find(|a| a.active && a.project_id == project && a.member_id == member)
            .ok_or_else(|| {
                StoreError::Roster(format!(
                    "'{member}' holds no active assignment on project {project}"
                ))
            })?;
        seat.active = false;
        tracing::info!(project, member, "member removed");
        Ok(())
    }
}
