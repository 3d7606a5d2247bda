//! Enumerations shared by the task tree.
//!
//! Lifecycle states for tasks and leaf items, project roles, the nesting policy and the
//! entity kinds that notifications and errors refer to.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// Leaf tasks move through `Pending`, `Accepted` and `Rejected`. Parent and root tasks use
/// `Pending`, `InProgress`, `WaitingForReview` and `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    InProgress,
    WaitingForReview,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Accepted => "Accepted",
            TaskStatus::Rejected => "Rejected",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::WaitingForReview => "WaitingForReview",
            TaskStatus::Completed => "Completed",
        })
    }
}

/// Lifecycle state of a leaf item (action item).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::Accepted => "Accepted",
            ItemStatus::Rejected => "Rejected",
        })
    }
}

/// Role a member holds on a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    Contributor,
    ScrumMaster,
    TeamLead,
}

impl Role {
    /// Roles allowed to accept or reject a completed task.
    pub fn can_review(self) -> bool {
        matches!(self, Role::ScrumMaster | Role::TeamLead)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Contributor => "contributor",
            Role::ScrumMaster => "scrum-master",
            Role::TeamLead => "team-lead",
        })
    }
}

/// How deep subtasks may nest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NestingPolicy {
    /// Subtasks may only hang directly off a root task.
    SingleLevel,
    #[default]
    MultiLevel,
}

/// Kinds of records that errors and notifications point at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Entity {
    Project,
    Assignment,
    Task,
    LeafItem,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Project => "project",
            Entity::Assignment => "assignment",
            Entity::Task => "task",
            Entity::LeafItem => "leaf item",
        })
    }
}
