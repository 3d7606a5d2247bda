//! Storage boundary and the per-operation unit of work.
//!
//! Every engine operation reads through a [`UnitOfWork`], stages all of its writes there
//! (including the whole ancestor walk) and commits them with a single
//! [`TaskStore::save_atomic`] call. Rows carry a `version`; the store refuses a change set
//! whose rows moved since they were read, so racing writers fail instead of overwriting.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;

use crate::error::{EngineError, Result, StoreError};
use crate::fields::Entity;
use crate::project::Assignment;
use crate::task::{AssignmentId, LeafItem, LeafItemId, ProjectId, Task, TaskId};

/// Persistence for tasks, leaf items and project assignments.
pub trait TaskStore {
    fn find_by_id(&self, id: TaskId) -> Option<Task>;

    /// Ids of the direct subtasks of `parent`.
    fn subtask_ids(&self, parent: TaskId) -> Vec<TaskId>;

    fn find_leaf_item(&self, id: LeafItemId) -> Option<LeafItem>;

    /// Ids of the leaf items attached to `task`.
    fn leaf_item_ids(&self, task: TaskId) -> Vec<LeafItemId>;

    fn find_assignment(&self, id: AssignmentId) -> Option<Assignment>;

    fn find_assignments_by_project(&self, project: ProjectId) -> Vec<Assignment>;

    fn next_task_id(&self) -> TaskId;

    fn next_leaf_item_id(&self) -> LeafItemId;

    /// Apply every change or none of them.
    fn save_atomic(&mut self, changes: ChangeSet) -> std::result::Result<(), StoreError>;
}

/// A row write guarded by the version it was read at. `expected` is `None` for inserts.
#[derive(Debug, Clone)]
pub struct Guarded<T> {
    pub row: T,
    pub expected: Option<u64>,
}

/// Everything one operation wants to persist.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub tasks: Vec<Guarded<Task>>,
    pub deleted_tasks: Vec<Guarded<TaskId>>,
    pub items: Vec<Guarded<LeafItem>>,
    pub deleted_items: Vec<Guarded<LeafItemId>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.deleted_tasks.is_empty()
            && self.items.is_empty()
            && self.deleted_items.is_empty()
    }
}

/// Direct children of a task: subtasks and leaf items together.
#[derive(Debug, Clone, Default)]
pub struct Children {
    pub subtasks: Vec<Task>,
    pub items: Vec<LeafItem>,
}

impl Children {
    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty() && self.items.is_empty()
    }

    pub fn total_weight(&self) -> u32 {
        self.subtasks.iter().map(Task::weight).sum::<u32>()
            + self.items.iter().map(LeafItem::weight).sum::<u32>()
    }

    /// `(weight, progress)` of every child.
    pub fn shares(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.subtasks
            .iter()
            .map(|t| (t.weight(), t.progress()))
            .chain(self.items.iter().map(|i| (i.weight(), i.progress())))
    }
}

/// Read-through overlay over a store that buffers writes until [`UnitOfWork::into_changes`].
pub struct UnitOfWork<'s, S: TaskStore + ?Sized> {
    store: &'s S,
    now_utc: i64,
    tasks: BTreeMap<TaskId, Option<Task>>,
    items: BTreeMap<LeafItemId, Option<LeafItem>>,
    task_versions: HashMap<TaskId, u64>,
    item_versions: HashMap<LeafItemId, u64>,
    next_task_id: Option<TaskId>,
    next_item_id: Option<LeafItemId>,
}

impl<'s, S: TaskStore + ?Sized> UnitOfWork<'s, S> {
    pub fn new(store: &'s S) -> Self {
        UnitOfWork {
            store,
            now_utc: Utc::now().timestamp(),
            tasks: BTreeMap::new(),
            items: BTreeMap::new(),
            task_versions: HashMap::new(),
            item_versions: HashMap::new(),
            next_task_id: None,
            next_item_id: None,
        }
    }

    pub fn now_utc(&self) -> i64 {
        self.now_utc
    }

    pub fn task(&mut self, id: TaskId) -> Option<Task> {
        if let Some(staged) = self.tasks.get(&id) {
            return staged.clone();
        }
        let task = self.store.find_by_id(id)?;
        self.task_versions.entry(id).or_insert(task.version);
        Some(task)
    }

    pub fn require_task(&mut self, id: TaskId) -> Result<Task> {
        self.task(id)
            .ok_or_else(|| EngineError::not_found(Entity::Task, id))
    }

    pub fn leaf_item(&mut self, id: LeafItemId) -> Option<LeafItem> {
        if let Some(staged) = self.items.get(&id) {
            return staged.clone();
        }
        let item = self.store.find_leaf_item(id)?;
        self.item_versions.entry(id).or_insert(item.version);
        Some(item)
    }

    pub fn require_leaf_item(&mut self, id: LeafItemId) -> Result<LeafItem> {
        self.leaf_item(id)
            .ok_or_else(|| EngineError::not_found(Entity::LeafItem, id))
    }

    /// Current direct subtasks of `parent`, staged writes included.
    pub fn subtasks(&mut self, parent: TaskId) -> Vec<Task> {
        let mut ids: BTreeSet<TaskId> = self.store.subtask_ids(parent).into_iter().collect();
        ids.extend(
            self.tasks
                .iter()
                .filter(|(_, t)| matches!(t, Some(t) if t.parent == Some(parent)))
                .map(|(id, _)| *id),
        );
        ids.into_iter()
            .filter_map(|id| self.task(id))
            .filter(|t| t.parent == Some(parent))
            .collect()
    }

    /// Current leaf items of `task`, staged writes included.
    pub fn items_of(&mut self, task: TaskId) -> Vec<LeafItem> {
        let mut ids: BTreeSet<LeafItemId> = self.store.leaf_item_ids(task).into_iter().collect();
        ids.extend(
            self.items
                .iter()
                .filter(|(_, i)| matches!(i, Some(i) if i.task_id == task))
                .map(|(id, _)| *id),
        );
        ids.into_iter()
            .filter_map(|id| self.leaf_item(id))
            .filter(|i| i.task_id == task)
            .collect()
    }

    pub fn children(&mut self, parent: TaskId) -> Children {
        Children {
            subtasks: self.subtasks(parent),
            items: self.items_of(parent),
        }
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<Assignment> {
        self.store.find_assignment(id)
    }

    pub fn assignments_by_project(&self, project: ProjectId) -> Vec<Assignment> {
        self.store.find_assignments_by_project(project)
    }

    pub fn allocate_task_id(&mut self) -> TaskId {
        let id = self.next_task_id.unwrap_or_else(|| self.store.next_task_id());
        self.next_task_id = Some(id + 1);
        id
    }

    pub fn allocate_leaf_item_id(&mut self) -> LeafItemId {
        let id = self.next_item_id.unwrap_or_else(|| self.store.next_leaf_item_id());
        self.next_item_id = Some(id + 1);
        id
    }

    pub fn stage_task(&mut self, mut task: Task) {
        task.updated_at_utc = self.now_utc;
        self.tasks.insert(task.id, Some(task));
    }

    pub fn stage_leaf_item(&mut self, mut item: LeafItem) {
        item.updated_at_utc = self.now_utc;
        self.items.insert(item.id, Some(item));
    }

    pub fn delete_task(&mut self, id: TaskId) {
        // Record the version before the tombstone hides the stored row.
        let _ = self.task(id);
        self.tasks.insert(id, None);
    }

    pub fn delete_leaf_item(&mut self, id: LeafItemId) {
        let _ = self.leaf_item(id);
        self.items.insert(id, None);
    }

    pub fn into_changes(self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (id, staged) in self.tasks {
            let expected = self.task_versions.get(&id).copied();
            match staged {
                Some(row) => changes.tasks.push(Guarded { row, expected }),
                // A row inserted and deleted inside one unit never reached the store.
                None if expected.is_some() => {
                    changes.deleted_tasks.push(Guarded { row: id, expected })
                }
                None => {}
            }
        }
        for (id, staged) in self.items {
            let expected = self.item_versions.get(&id).copied();
            match staged {
                Some(row) => changes.items.push(Guarded { row, expected }),
                None if expected.is_some() => {
                    changes.deleted_items.push(Guarded { row: id, expected })
                }
                None => {}
            }
        }
        changes
    }
}
