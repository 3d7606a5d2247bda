//! Task tree data structures.
//!
//! A `Task` is a node in a per-project tree; a `LeafItem` is an action item attached to a
//! task. The aggregate fields (`weight`, `progress`, `depth`, `is_leaf`, effort hours) are
//! private: only the roll-up engine in [`crate::rollup`] may change them once a node exists.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::{ItemStatus, TaskStatus};
use crate::rollup::Rollup;

pub type TaskId = u64;
pub type LeafItemId = u64;
pub type AssignmentId = u64;
pub type ProjectId = u64;
pub type MemberId = String;

/// A work item in the project tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub assignment_id: AssignmentId,
    pub parent: Option<TaskId>,
    depth: u32,
    is_leaf: bool,
    weight: u32,
    progress: f64,
    pub status: TaskStatus,
    pub assigned_member: Option<MemberId>,
    pub assigned_by: Option<MemberId>,
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub auto_todo: bool,
    pub start_date: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    #[serde(default)]
    estimated_hours: f64,
    #[serde(default)]
    actual_hours: f64,
    #[serde(default)]
    pub version: u64,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        draft: &NewTask,
        assignment_id: AssignmentId,
        depth: u32,
        now_utc: i64,
    ) -> Self {
        Task {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            assignment_id,
            parent: draft.parent,
            depth,
            is_leaf: true,
            weight: draft.weight,
            progress: 0.0,
            status: TaskStatus::Pending,
            assigned_member: None,
            assigned_by: None,
            rejection_reason: None,
            auto_todo: draft.auto_todo,
            start_date: draft.start_date,
            due: draft.due,
            estimated_hours: draft.estimated_hours.unwrap_or(0.0),
            actual_hours: 0.0,
            version: 0,
            created_at_utc: now_utc,
            updated_at_utc: now_utc,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn estimated_hours(&self) -> f64 {
        self.estimated_hours
    }

    pub fn actual_hours(&self) -> f64 {
        self.actual_hours
    }

    pub fn set_depth(&mut self, _: &Rollup, depth: u32) {
        self.depth = depth;
    }

    pub fn set_leaf(&mut self, _: &Rollup, is_leaf: bool) {
        self.is_leaf = is_leaf;
    }

    pub fn set_weight(&mut self, _: &Rollup, weight: u32) {
        self.weight = weight;
    }

    pub fn set_progress(&mut self, _: &Rollup, progress: f64) {
        self.progress = progress;
    }

    pub fn set_hours(&mut self, _: &Rollup, estimated: f64, actual: f64) {
        self.estimated_hours = estimated;
        self.actual_hours = actual;
    }

    /// Member-reported effort. Only meaningful while the task has no children.
    pub fn record_actual_hours(&mut self, hours: f64) {
        self.actual_hours = hours;
    }

    pub fn record_estimated_hours(&mut self, hours: f64) {
        self.estimated_hours = hours;
    }

    pub fn is_assigned_to(&self, member: &str) -> bool {
        self.assigned_member.as_deref() == Some(member)
    }
}

/// An action item hanging off a task. Not itself a tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafItem {
    pub id: LeafItemId,
    pub task_id: TaskId,
    pub title: String,
    weight: u32,
    progress: f64,
    pub status: ItemStatus,
    pub rejection_reason: Option<String>,
    pub due: Option<NaiveDate>,
    /// Created by an assignment cascade rather than by hand.
    #[serde(default)]
    pub companion: bool,
    #[serde(default)]
    pub version: u64,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
}

impl LeafItem {
    pub(crate) fn new(id: LeafItemId, task_id: TaskId, draft: &NewLeafItem, now_utc: i64) -> Self {
        LeafItem {
            id,
            task_id,
            title: draft.title.trim().to_string(),
            weight: draft.weight,
            progress: 0.0,
            status: ItemStatus::Pending,
            rejection_reason: None,
            due: draft.due,
            companion: false,
            version: 0,
            created_at_utc: now_utc,
            updated_at_utc: now_utc,
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn set_progress(&mut self, _: &Rollup, progress: f64) {
        self.progress = progress;
    }
}

/// Fields accepted by `CreateTask` / `AddSubtask`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub parent: Option<TaskId>,
    /// Required for root tasks; subtasks inherit their parent's when absent.
    pub assignment_id: Option<AssignmentId>,
    pub weight: u32,
    pub start_date: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub assignee: Option<MemberId>,
    pub estimated_hours: Option<f64>,
    pub auto_todo: bool,
}

impl NewTask {
    pub fn new(title: impl Into<String>, weight: u32) -> Self {
        NewTask {
            title: title.into(),
            weight,
            ..NewTask::default()
        }
    }
}

/// Fields accepted by `AddLeafItem`.
#[derive(Debug, Clone, Default)]
pub struct NewLeafItem {
    pub title: String,
    pub weight: u32,
    pub due: Option<NaiveDate>,
}

/// Partial update for `UpdateTask`. `None` leaves a field untouched; the nested options
/// distinguish "clear" from "keep".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub due: Option<Option<NaiveDate>>,
    pub weight: Option<i64>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub auto_todo: Option<bool>,
    pub parent: Option<Option<TaskId>>,
}

impl TaskPatch {
    /// True when the patch only touches fields any project member may edit.
    pub fn is_member_editable(&self) -> bool {
        self.start_date.is_none()
            && self.due.is_none()
            && self.weight.is_none()
            && self.estimated_hours.is_none()
            && self.auto_todo.is_none()
            && self.parent.is_none()
    }
}

/// A task together with its full subtree, as returned by `GetTask`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTree {
    pub task: Task,
    pub items: Vec<LeafItem>,
    pub subtasks: Vec<TaskTree>,
}

impl TaskTree {
    /// Every task id in the tree, root first.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut out = vec![self.task.id];
        for sub in &self.subtasks {
            out.extend(sub.ids());
        }
        out
    }
}
