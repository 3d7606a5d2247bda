//! Task store implementations and formatting helpers.
//!
//! `Database` is the in-memory row set (projects, assignments, tasks, leaf items) and
//! implements [`TaskStore`] directly. `JsonStore` wraps it with a JSON file. Every commit
//! holds an exclusive lock on a sidecar `.lock` file, re-reads the file, applies the change
//! set to what is on disk and writes it back with a temp-file-and-rename.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fields::Entity;
use crate::project::{Assignment, Project};
use crate::store::{ChangeSet, Guarded, TaskStore};
use crate::task::{AssignmentId, LeafItem, LeafItemId, ProjectId, Task, TaskId};

/// All persisted rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub leaf_items: Vec<LeafItem>,
}

impl Database {
    /// Load from a JSON file. A missing file yields an empty database.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Database::default());
        }
        let mut buf = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut buf))
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&buf).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to a JSON file via temp file + rename.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut f = File::create(&tmp).map_err(io_err)?;
        f.write_all(data.as_bytes()).map_err(io_err)?;
        f.flush().map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks whose assignment belongs to `project`.
    pub fn tasks_in_project(&self, project: ProjectId) -> Vec<&Task> {
        let seats: HashMap<AssignmentId, ProjectId> = self
            .assignments
            .iter()
            .map(|a| (a.id, a.project_id))
            .collect();
        self.tasks
            .iter()
            .filter(|t| seats.get(&t.assignment_id) == Some(&project))
            .collect()
    }

    fn check_version(
        entity: Entity,
        id: u64,
        expected: Option<u64>,
        found: Option<u64>,
    ) -> Result<(), StoreError> {
        match (expected, found) {
            (None, None) => Ok(()),
            (Some(expected), Some(found)) if expected == found => Ok(()),
            (Some(_), None) => Err(StoreError::Missing { entity, id }),
            (expected, found) => Err(StoreError::Conflict {
                entity,
                id,
                expected: expected.unwrap_or(0),
                found: found.unwrap_or(0),
            }),
        }
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<(), StoreError> {
        let task_versions: HashMap<TaskId, u64> =
            self.tasks.iter().map(|t| (t.id, t.version)).collect();
        let item_versions: HashMap<LeafItemId, u64> =
            self.leaf_items.iter().map(|i| (i.id, i.version)).collect();

        // Validate everything first so a conflict leaves no trace.
        for Guarded { row, expected } in &changes.tasks {
            let found = task_versions.get(&row.id).copied();
            Self::check_version(Entity::Task, row.id, *expected, found)?;
        }
        for Guarded { row, expected } in &changes.deleted_tasks {
            Self::check_version(Entity::Task, *row, *expected, task_versions.get(row).copied())?;
        }
        for Guarded { row, expected } in &changes.items {
            let found = item_versions.get(&row.id).copied();
            Self::check_version(Entity::LeafItem, row.id, *expected, found)?;
        }
        for Guarded { row, expected } in &changes.deleted_items {
            let found = item_versions.get(row).copied();
            Self::check_version(Entity::LeafItem, *row, *expected, found)?;
        }

        let mut tasks: BTreeMap<TaskId, Task> =
            std::mem::take(&mut self.tasks).into_iter().map(|t| (t.id, t)).collect();
        for Guarded { mut row, expected } in changes.tasks {
            row.version = expected.map_or(0, |v| v + 1);
            tasks.insert(row.id, row);
        }
        for Guarded { row, .. } in changes.deleted_tasks {
            tasks.remove(&row);
        }
        self.tasks = tasks.into_values().collect();

        let mut items: BTreeMap<LeafItemId, LeafItem> = std::mem::take(&mut self.leaf_items)
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        for Guarded { mut row, expected } in changes.items {
            row.version = expected.map_or(0, |v| v + 1);
            items.insert(row.id, row);
        }
        for Guarded { row, .. } in changes.deleted_items {
            items.remove(&row);
        }
        self.leaf_items = items.into_values().collect();
        Ok(())
    }
}

impl TaskStore for Database {
    fn find_by_id(&self, id: TaskId) -> Option<Task> {
        self.get(id).cloned()
    }

    fn subtask_ids(&self, parent: TaskId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.parent == Some(parent))
            .map(|t| t.id)
            .collect()
    }

    fn find_leaf_item(&self, id: LeafItemId) -> Option<LeafItem> {
        self.leaf_items.iter().find(|i| i.id == id).cloned()
    }

    fn leaf_item_ids(&self, task: TaskId) -> Vec<LeafItemId> {
        self.leaf_items
            .iter()
            .filter(|i| i.task_id == task)
            .map(|i| i.id)
            .collect()
    }

    fn find_assignment(&self, id: AssignmentId) -> Option<Assignment> {
        self.assignments.iter().find(|a| a.id == id).cloned()
    }

    fn find_assignments_by_project(&self, project: ProjectId) -> Vec<Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.project_id == project)
            .cloned()
            .collect()
    }

    fn next_task_id(&self) -> TaskId {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn next_leaf_item_id(&self) -> LeafItemId {
        self.leaf_items.iter().map(|i| i.id).max().unwrap_or(0) + 1
    }

    fn save_atomic(&mut self, changes: ChangeSet) -> Result<(), StoreError> {
        self.apply(changes)
    }
}

/// A [`Database`] persisted to a JSON file after every commit.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    db: Database,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(JsonStore {
            path: path.to_path_buf(),
            db: Database::load(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Run `f` against the rows currently on disk and persist the result.
    ///
    /// The snapshot held since `open` only serves reads. Writes are re-validated against
    /// a fresh load under an exclusive lock, so a row committed by another handle since
    /// then surfaces as [`StoreError::Conflict`] instead of being overwritten.
    pub fn update<T>(
        &mut self,
        f: impl FnOnce(&mut Database) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock_path = self.lock_path();
        let io_err = |source| StoreError::Io {
            path: lock_path.clone(),
            source,
        };
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err)?;
        lock.lock_exclusive().map_err(io_err)?;

        let result = Database::load(&self.path).and_then(|mut next| {
            let out = f(&mut next)?;
            next.save(&self.path)?;
            Ok((out, next))
        });

        lock.unlock().map_err(io_err)?;
        let (out, next) = result?;
        self.db = next;
        Ok(out)
    }
}

impl TaskStore for JsonStore {
    fn find_by_id(&self, id: TaskId) -> Option<Task> {
        self.db.find_by_id(id)
    }

    fn subtask_ids(&self, parent: TaskId) -> Vec<TaskId> {
        self.db.subtask_ids(parent)
    }

    fn find_leaf_item(&self, id: LeafItemId) -> Option<LeafItem> {
        self.db.find_leaf_item(id)
    }

    fn leaf_item_ids(&self, task: TaskId) -> Vec<LeafItemId> {
        self.db.leaf_item_ids(task)
    }

    fn find_assignment(&self, id: AssignmentId) -> Option<Assignment> {
        self.db.find_assignment(id)
    }

    fn find_assignments_by_project(&self, project: ProjectId) -> Vec<Assignment> {
        self.db.find_assignments_by_project(project)
    }

    fn next_task_id(&self) -> TaskId {
        self.db.next_task_id()
    }

    fn next_leaf_item_id(&self) -> LeafItemId {
        self.db.next_leaf_item_id()
    }

    fn save_atomic(&mut self, changes: ChangeSet) -> Result<(), StoreError> {
        self.update(|db| db.apply(changes))
    }
}

/// Parse a due date: `YYYY-MM-DD`, `today`, `tomorrow`, `in Nd` or `in Nw`.
pub fn parse_due_input(s: &str) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();
    let today = Local::now().date_naive();
    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }
    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(n) = rest.strip_suffix('d') {
            return n.trim().parse::<i64>().ok().map(|d| today + Duration::days(d));
        }
        if let Some(n) = rest.strip_suffix('w') {
            return n.trim().parse::<i64>().ok().map(|w| today + Duration::weeks(w));
        }
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => match (d - today).num_days() {
            0 => "today".into(),
            1 => "tomorrow".into(),
            n if n > 1 => format!("in {n}d"),
            n => format!("{}d late", -n),
        },
    }
}

/// Print tasks as a table. With `indent`, titles are indented by tree depth.
pub fn print_table(tasks: &[&Task], indent: bool) {
    println!(
        "{:<5} {:<18} {:>4} {:>6} {:<10} {:<12} {}",
        "ID", "Status", "Wt", "Prog", "Due", "Assignee", "Title"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        let indent_str = if indent { "  ".repeat(t.depth() as usize) } else { String::new() };
        let assignee = t.assigned_member.as_deref().unwrap_or("-");
        println!(
            "{:<5} {:<18} {:>4} {:>5.1}% {:<10} {:<12} {}{}",
            t.id,
            t.status.to_string(),
            t.weight(),
            t.progress(),
            format_due_relative(t.due, today),
            truncate(assignee, 12),
            indent_str,
            t.title
        );
    }
}

/// Truncate a string to a maximum width, adding an ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Role;
    use crate::task::NewTask;

    fn sample_task(id: TaskId, parent: Option<TaskId>) -> Task {
        let draft = NewTask {
            parent,
            ..NewTask::new(format!("task {id}"), 10)
        };
        Task::new(id, &draft, 1, u32::from(parent.is_some()), 0)
    }

    #[test]
    fn test_save_atomic_bumps_versions() {
        let mut db = Database::default();
        let changes = ChangeSet {
            tasks: vec![Guarded { row: sample_task(1, None), expected: None }],
            ..ChangeSet::default()
        };
        db.save_atomic(changes).unwrap();
        assert_eq!(db.get(1).unwrap().version, 0);

        let mut task = db.get(1).cloned().unwrap();
        task.title = "renamed".into();
        let changes = ChangeSet {
            tasks: vec![Guarded { row: task, expected: Some(0) }],
            ..ChangeSet::default()
        };
        db.save_atomic(changes).unwrap();
        assert_eq!(db.get(1).unwrap().version, 1);
        assert_eq!(db.get(1).unwrap().title, "renamed");
    }

    #[test]
    fn test_stale_write_is_rejected_whole() {
        let mut db = Database::default();
        db.save_atomic(ChangeSet {
            tasks: vec![
                Guarded { row: sample_task(1, None), expected: None },
                Guarded { row: sample_task(2, Some(1)), expected: None },
            ],
            ..ChangeSet::default()
        })
        .unwrap();

        // Writer A commits first.
        let mut a = db.get(1).cloned().unwrap();
        a.title = "A".into();
        db.save_atomic(ChangeSet {
            tasks: vec![Guarded { row: a, expected: Some(0) }],
            ..ChangeSet::default()
        })
        .unwrap();

        // Writer B read version 0 of both rows before A committed.
        let mut b_child = db.get(2).cloned().unwrap();
        b_child.title = "B child".into();
        let mut b_root = sample_task(1, None);
        b_root.title = "B".into();
        let err = db
            .save_atomic(ChangeSet {
                tasks: vec![
                    Guarded { row: b_child, expected: Some(0) },
                    Guarded { row: b_root, expected: Some(0) },
                ],
                ..ChangeSet::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id: 1, expected: 0, found: 1, .. }));
        assert_eq!(db.get(1).unwrap().title, "A");
        assert_eq!(db.get(2).unwrap().title, "task 2");
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let mut store = JsonStore::open(&path).unwrap();
        assert!(store.db().tasks.is_empty());

        let pid = store
            .update(|db| db.add_project("Apollo", None, 0).map(|p| p.id))
            .unwrap();
        store
            .update(|db| db.add_member(pid, "ana", Role::Contributor).map(|_| ()))
            .unwrap();
        store
            .save_atomic(ChangeSet {
                tasks: vec![Guarded { row: sample_task(1, None), expected: None }],
                ..ChangeSet::default()
            })
            .unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.db().projects.len(), 1);
        assert_eq!(reopened.find_assignments_by_project(pid).len(), 1);
        assert_eq!(reopened.find_by_id(1).unwrap().title, "task 1");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_second_handle_cannot_overwrite_first_commit() {
        use crate::engine::{testkit::World, Engine};
        use crate::error::EngineError;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let mut w = World::new();
        let draft = w.root("R", 100);
        let mut engine = w.engine();
        let r = engine.create_task(draft).unwrap().id;
        let a = engine.add_subtask(r, NewTask::new("A", 60)).unwrap().id;
        let b = engine.add_subtask(r, NewTask::new("B", 40)).unwrap().id;
        engine.assign_task(a, Some("ana"), "lead").unwrap();
        engine.assign_task(b, Some("bo"), "lead").unwrap();
        engine.accept_task(a, "ana").unwrap();
        engine.accept_task(b, "bo").unwrap();
        drop(engine);
        w.db.save(&path).unwrap();

        // Both handles load the same snapshot before either commits.
        let mut first = JsonStore::open(&path).unwrap();
        let mut second = JsonStore::open(&path).unwrap();
        Engine::new(&mut first, &w.sink, &w.config)
            .update_progress(a, "ana", 50.0)
            .unwrap();
        let stale = Engine::new(&mut second, &w.sink, &w.config).update_progress(b, "bo", 25.0);
        assert!(matches!(
            stale,
            Err(EngineError::Store(StoreError::Conflict { entity: Entity::Task, .. }))
        ));

        let on_disk = JsonStore::open(&path).unwrap();
        assert_eq!(on_disk.find_by_id(a).unwrap().progress(), 50.0);
        assert_eq!(on_disk.find_by_id(b).unwrap().progress(), 0.0);
        assert_eq!(on_disk.find_by_id(r).unwrap().progress(), 30.0);

        // Resubmitting from a fresh handle lands on top of the first commit.
        let mut retry = JsonStore::open(&path).unwrap();
        Engine::new(&mut retry, &w.sink, &w.config)
            .update_progress(b, "bo", 25.0)
            .unwrap();
        let on_disk = JsonStore::open(&path).unwrap();
        assert_eq!(on_disk.find_by_id(a).unwrap().progress(), 50.0);
        assert_eq!(on_disk.find_by_id(r).unwrap().progress(), 40.0);
    }

    #[test]
    fn test_roster_edits_from_two_handles_both_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let mut setup = JsonStore::open(&path).unwrap();
        let pid = setup
            .update(|db| db.add_project("Apollo", None, 0).map(|p| p.id))
            .unwrap();

        let mut first = JsonStore::open(&path).unwrap();
        let mut second = JsonStore::open(&path).unwrap();
        first
            .update(|db| db.add_member(pid, "ana", Role::Contributor).map(|_| ()))
            .unwrap();
        second
            .update(|db| db.add_member(pid, "bo", Role::Contributor).map(|_| ()))
            .unwrap();

        let seated: Vec<String> = JsonStore::open(&path)
            .unwrap()
            .find_assignments_by_project(pid)
            .into_iter()
            .map(|a| a.member_id)
            .collect();
        assert_eq!(seated.len(), 2);
        assert!(seated.contains(&"ana".to_string()) && seated.contains(&"bo".to_string()));
    }

    #[test]
    fn test_failed_roster_edit_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let mut store = JsonStore::open(&path).unwrap();
        assert!(store.update(|db| db.add_member(7, "ana", Role::Contributor).map(|_| ())).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_format_due_relative() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(today), today), "today");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2024, 5, 11), today), "tomorrow");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2024, 5, 14), today), "in 4d");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2024, 5, 8), today), "2d late");
    }

    #[test]
    fn test_parse_due_input() {
        assert_eq!(parse_due_input("2024-02-29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        let today = Local::now().date_naive();
        assert_eq!(parse_due_input(" Tomorrow "), Some(today + Duration::days(1)));
        assert_eq!(parse_due_input("in 2w"), Some(today + Duration::weeks(2)));
        assert_eq!(parse_due_input("someday"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }
}
