//! Command implementations for the CLI interface.
//!
//! Each handler parses its arguments into engine inputs, runs one engine operation
//! through a [`Session`] and prints the outcome. Roster commands (projects, members) edit
//! the store directly.

use chrono::{Local, NaiveDate, TimeZone, Utc};
use clap::{Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use crate::config::EngineConfig;
use crate::db::{format_due_relative, parse_due_input, print_table, truncate, Database, JsonStore};
use crate::engine::Engine;
use crate::error::{AppError, EngineError};
use crate::fields::Role;
use crate::lifecycle::allowed_transitions;
use crate::notify::NotificationSink;
use crate::store::UnitOfWork;
use crate::task::{AssignmentId, NewLeafItem, NewTask, ProjectId, Task, TaskId, TaskPatch, TaskTree};
use crate::tree;

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage project members.
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// Add a root task to a project.
    Add {
        /// Short title for the task.
        title: String,
        /// Project ID or name.
        #[arg(long)]
        project: String,
        /// Member creating the task; their seat owns it.
        #[arg(long = "as")]
        actor: String,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// Add a subtask below an existing task.
    Subtask {
        /// Parent task ID.
        parent: TaskId,
        /// Short title for the subtask.
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// Manage the leaf items (action items) of a task.
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Assign a task and its whole subtree. Omit the member to unassign.
    Assign {
        id: TaskId,
        member: Option<String>,
        /// Member making the assignment.
        #[arg(long = "as")]
        actor: String,
    },

    /// Update fields on a task.
    Update {
        id: TaskId,
        /// Member making the change. Scheduling, weight and structure need a
        /// scrum-master or team-lead seat.
        #[arg(long = "as")]
        actor: String,
        #[command(flatten)]
        changes: TaskChanges,
    },

    /// Accept an assigned leaf task.
    Accept {
        id: TaskId,
        #[arg(long = "as")]
        actor: String,
    },

    /// Reject an assigned leaf task.
    Reject {
        id: TaskId,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Report progress (0-100) on an accepted leaf task.
    Progress {
        id: TaskId,
        value: f64,
        #[arg(long = "as")]
        actor: String,
    },

    /// Submit a finished task for review.
    Submit {
        id: TaskId,
        #[arg(long = "as")]
        actor: String,
    },

    /// Accept the completion of a task waiting for review.
    Approve {
        id: TaskId,
        #[arg(long = "as")]
        actor: String,
    },

    /// Send a task waiting for review back to its assignee.
    Decline {
        id: TaskId,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Delete a task with all its descendants and leaf items.
    Delete { id: TaskId },

    /// View a task with its subtree.
    View {
        id: TaskId,
        #[arg(long, value_enum, default_value_t = ViewFormat::Tree)]
        format: ViewFormat,
        /// Show ancestor chain.
        #[arg(long)]
        parents: bool,
    },

    /// List tasks.
    List {
        /// Only tasks of this project (ID or name).
        #[arg(long)]
        project: Option<String>,
        /// Only tasks assigned to this member.
        #[arg(long)]
        assignee: Option<String>,
        /// Render as a tree.
        #[arg(long)]
        tree: bool,
    },

    /// Re-derive weight and progress of a task and its ancestors.
    Recompute { id: TaskId },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Create a project.
    Add {
        name: String,
        #[arg(long)]
        department: Option<String>,
    },
    /// List projects.
    List,
}

#[derive(Subcommand)]
pub enum MemberAction {
    /// Seat a member on a project.
    Add {
        project: String,
        member: String,
        #[arg(long, value_enum, default_value_t = Role::Contributor)]
        role: Role,
    },
    /// Deactivate a member's seat.
    Remove { project: String, member: String },
    /// List members of a project.
    List { project: String },
}

#[derive(Subcommand)]
pub enum ItemAction {
    /// Attach a leaf item to a task.
    Add {
        task: TaskId,
        title: String,
        #[arg(long)]
        weight: u32,
        #[arg(long)]
        due: Option<String>,
    },
    /// Accept a leaf item as the task's assignee.
    Accept {
        id: u64,
        #[arg(long = "as")]
        actor: String,
    },
    /// Reject a leaf item as the task's assignee.
    Reject {
        id: u64,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Report progress (0-100) on an accepted leaf item.
    Progress {
        id: u64,
        value: f64,
        #[arg(long = "as")]
        actor: String,
    },
    /// Delete a leaf item.
    Delete { id: u64 },
}

/// Options shared by `add` and `subtask`.
#[derive(clap::Args)]
pub struct TaskFields {
    /// Weight within the parent's 100-unit budget.
    #[arg(long)]
    pub weight: u32,
    #[arg(long)]
    pub desc: Option<String>,
    /// Start date: YYYY-MM-DD, "today", "tomorrow", "in Nd" or "in Nw".
    #[arg(long)]
    pub start: Option<String>,
    /// Due date, same formats as --start.
    #[arg(long)]
    pub due: Option<String>,
    /// Member to assign the task to.
    #[arg(long)]
    pub assignee: Option<String>,
    /// Estimated effort in hours.
    #[arg(long)]
    pub estimate: Option<f64>,
    /// Create a companion action item when the task is assigned.
    #[arg(long)]
    pub auto_todo: bool,
}

/// Options of `update`. Unset options leave the field alone.
#[derive(clap::Args, Default)]
pub struct TaskChanges {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub desc: Option<String>,
    /// Start date: YYYY-MM-DD, "today", "tomorrow", "in Nd" or "in Nw".
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub weight: Option<i64>,
    /// Estimated effort in hours.
    #[arg(long)]
    pub estimate: Option<f64>,
    /// Actual effort in hours.
    #[arg(long)]
    pub actual: Option<f64>,
    #[arg(long)]
    pub auto_todo: Option<bool>,
    /// New parent task ID.
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<TaskId>,
    /// Make the task a root task.
    #[arg(long)]
    pub clear_parent: bool,
    #[arg(long, conflicts_with = "desc")]
    pub clear_desc: bool,
    #[arg(long, conflicts_with = "start")]
    pub clear_start: bool,
    #[arg(long, conflicts_with = "due")]
    pub clear_due: bool,
}

impl TaskChanges {
    fn into_patch(self) -> Result<TaskPatch, AppError> {
        let clear_or = |clear: bool, value: Option<NaiveDate>| {
            if clear {
                Some(None)
            } else {
                value.map(Some)
            }
        };
        Ok(TaskPatch {
            title: self.title,
            description: if self.clear_desc { Some(None) } else { self.desc.map(Some) },
            start_date: clear_or(self.clear_start, parse_date("start", self.start)?),
            due: clear_or(self.clear_due, parse_date("due", self.due)?),
            weight: self.weight,
            estimated_hours: self.estimate,
            actual_hours: self.actual,
            auto_todo: self.auto_todo,
            parent: if self.clear_parent { Some(None) } else { self.parent.map(Some) },
        })
    }
}

/// Output format for `view`.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ViewFormat {
    Tree,
    Json,
}

/// Store, sink and config for one CLI invocation.
pub struct Session {
    pub store: JsonStore,
    pub sink: Box<dyn NotificationSink>,
    pub config: EngineConfig,
}

impl Session {
    /// Run one engine operation and report notifications that could not be delivered.
    pub fn run<T>(
        &mut self,
        op: impl FnOnce(&mut Engine<'_, JsonStore, dyn NotificationSink>) -> Result<T, EngineError>,
    ) -> Result<T, AppError> {
        let mut engine = Engine::new(&mut self.store, self.sink.as_ref(), &self.config);
        let out = op(&mut engine);
        let undelivered = engine.take_undelivered();
        if !undelivered.is_empty() {
            eprintln!("warning: {} notification(s) could not be delivered", undelivered.len());
        }
        Ok(out?)
    }

    fn db(&self) -> &Database {
        self.store.db()
    }
}

fn parse_date(field: &str, input: Option<String>) -> Result<Option<NaiveDate>, AppError> {
    match input {
        None => Ok(None),
        Some(s) => parse_due_input(&s)
            .map(Some)
            .ok_or_else(|| AppError::Usage(format!("invalid {field} date '{s}'"))),
    }
}

fn resolve_project(db: &Database, identifier: &str) -> Result<ProjectId, AppError> {
    db.resolve_project(identifier).map_err(AppError::Usage)
}

fn seat_of(db: &Database, project: ProjectId, member: &str) -> Result<AssignmentId, AppError> {
    db.assignments
        .iter()
        .find(|a| a.active && a.project_id == project && a.member_id == member)
        .map(|a| a.id)
        .ok_or_else(|| {
            EngineError::NotAMember {
                member: member.to_string(),
                project,
            }
            .into()
        })
}

/// Whether `member` holds a reviewing seat on the project owning task `id`.
fn is_supervisor(db: &Database, id: TaskId, member: &str) -> bool {
    let Some(task) = db.get(id) else { return false };
    let Some(project) = db
        .assignments
        .iter()
        .find(|a| a.id == task.assignment_id)
        .map(|a| a.project_id)
    else {
        return false;
    };
    db.assignments
        .iter()
        .any(|a| {
            a.active && a.project_id == project && a.member_id == member && a.role.can_review()
        })
}

fn new_task(title: String, fields: TaskFields) -> Result<NewTask, AppError> {
    Ok(NewTask {
        title,
        description: fields.desc,
        weight: fields.weight,
        start_date: parse_date("start", fields.start)?,
        due: parse_date("due", fields.due)?,
        assignee: fields.assignee,
        estimated_hours: fields.estimate,
        auto_todo: fields.auto_todo,
        ..NewTask::default()
    })
}

fn format_utc(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map_or_else(|| "-".into(), |t| t.to_rfc3339())
}

pub fn cmd_project(session: &mut Session, action: ProjectAction) -> Result<(), AppError> {
    match action {
        ProjectAction::Add { name, department } => {
            let now = Utc::now().timestamp();
            let project = session
                .store
                .update(|db| db.add_project(&name, department, now).cloned())?;
            println!("Created project {} '{}' (key {}).", project.id, project.name, project.key);
        }
        ProjectAction::List => {
            let db = session.db();
            println!("{:<5} {:<20} {:<16} {:>7} {}", "ID", "Name", "Key", "Tasks", "Department");
            for p in &db.projects {
                println!(
                    "{:<5} {:<20} {:<16} {:>7} {}",
                    p.id,
                    truncate(&p.name, 20),
                    truncate(&p.key, 16),
                    db.tasks_in_project(p.id).len(),
                    p.department.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_member(session: &mut Session, action: MemberAction) -> Result<(), AppError> {
    match action {
        MemberAction::Add { project, member, role } => {
            let project = resolve_project(session.db(), &project)?;
            let seat = session
                .store
                .update(|db| db.add_member(project, &member, role).map(|a| a.id))?;
            println!("Seated '{member}' on project {project} as {role} (assignment {seat}).");
        }
        MemberAction::Remove { project, member } => {
            let project = resolve_project(session.db(), &project)?;
            session.store.update(|db| db.remove_member(project, &member))?;
            println!("Removed '{member}' from project {project}.");
        }
        MemberAction::List { project } => {
            let db = session.db();
            let project = resolve_project(db, &project)?;
            println!("{:<5} {:<16} {:<12} {}", "Seat", "Member", "Role", "Active");
            for a in db.assignments.iter().filter(|a| a.project_id == project) {
                println!(
                    "{:<5} {:<16} {:<12} {}",
                    a.id,
                    truncate(&a.member_id, 16),
                    a.role.to_string(),
                    if a.active { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_add(
    session: &mut Session,
    title: String,
    project: String,
    actor: String,
    fields: TaskFields,
) -> Result<(), AppError> {
    let project = resolve_project(session.db(), &project)?;
    let seat = seat_of(session.db(), project, &actor)?;
    let draft = NewTask {
        assignment_id: Some(seat),
        ..new_task(title, fields)?
    };
    let task = session.run(|engine| engine.create_task(draft))?;
    println!("Added task {}: {}", task.id, task.title);
    Ok(())
}

pub fn cmd_subtask(
    session: &mut Session,
    parent: TaskId,
    title: String,
    fields: TaskFields,
) -> Result<(), AppError> {
    let draft = new_task(title, fields)?;
    let task = session.run(|engine| engine.add_subtask(parent, draft))?;
    println!("Added subtask {} under {}: {}", task.id, parent, task.title);
    Ok(())
}

pub fn cmd_item(session: &mut Session, action: ItemAction) -> Result<(), AppError> {
    match action {
        ItemAction::Add { task, title, weight, due } => {
            let draft = NewLeafItem {
                title,
                weight,
                due: parse_date("due", due)?,
            };
            let item = session.run(|engine| engine.add_leaf_item(task, draft))?;
            println!("Added action item {} to task {}: {}", item.id, task, item.title);
        }
        ItemAction::Accept { id, actor } => {
            session.run(|engine| engine.accept_leaf_item(id, &actor))?;
            println!("Action item {id} accepted.");
        }
        ItemAction::Reject { id, actor, reason } => {
            session.run(|engine| engine.reject_leaf_item(id, &actor, reason.as_deref()))?;
            println!("Action item {id} rejected.");
        }
        ItemAction::Progress { id, value, actor } => {
            session.run(|engine| engine.update_leaf_item_progress(id, &actor, value))?;
            println!("Action item {id} at {value:.1}%.");
        }
        ItemAction::Delete { id } => {
            if session.run(|engine| engine.delete_leaf_item(id))? {
                println!("Action item {id} deleted.");
            } else {
                println!("Action item {id} not found.");
            }
        }
    }
    Ok(())
}

pub fn cmd_assign(
    session: &mut Session,
    id: TaskId,
    member: Option<String>,
    actor: String,
) -> Result<(), AppError> {
    session.run(|engine| engine.assign_task(id, member.as_deref(), &actor))?;
    match member.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(m) => println!("Task {id} and its subtasks assigned to {m}."),
        None => println!("Task {id} and its subtasks unassigned."),
    }
    Ok(())
}

pub fn cmd_update(
    session: &mut Session,
    id: TaskId,
    actor: String,
    changes: TaskChanges,
) -> Result<(), AppError> {
    let patch = changes.into_patch()?;
    let supervisor = is_supervisor(session.db(), id, &actor);
    let task = session.run(|engine| engine.update_task(id, patch, supervisor))?;
    println!("Updated task {}: {}", task.id, task.title);
    Ok(())
}

pub fn cmd_accept(session: &mut Session, id: TaskId, actor: String) -> Result<(), AppError> {
    session.run(|engine| engine.accept_task(id, &actor))?;
    println!("Task {id} accepted.");
    Ok(())
}

pub fn cmd_reject(
    session: &mut Session,
    id: TaskId,
    actor: String,
    reason: Option<String>,
) -> Result<(), AppError> {
    session.run(|engine| engine.reject_task(id, &actor, reason.as_deref()))?;
    println!("Task {id} rejected.");
    Ok(())
}

pub fn cmd_progress(
    session: &mut Session,
    id: TaskId,
    value: f64,
    actor: String,
) -> Result<(), AppError> {
    session.run(|engine| engine.update_progress(id, &actor, value))?;
    println!("Task {id} at {value:.1}%.");
    let chain = tree::ancestors(&mut UnitOfWork::new(session.db()), id);
    if let Some(root) = chain.last().and_then(|r| session.db().get(*r)) {
        println!("Root task {} now at {:.1}%.", root.id, root.progress());
    }
    Ok(())
}

pub fn cmd_submit(session: &mut Session, id: TaskId, actor: String) -> Result<(), AppError> {
    session.run(|engine| engine.submit_for_review(id, &actor))?;
    println!("Task {id} submitted for review.");
    Ok(())
}

pub fn cmd_approve(session: &mut Session, id: TaskId, actor: String) -> Result<(), AppError> {
    session.run(|engine| engine.accept_completion(id, &actor))?;
    println!("Task {id} completed.");
    Ok(())
}

pub fn cmd_decline(
    session: &mut Session,
    id: TaskId,
    actor: String,
    reason: Option<String>,
) -> Result<(), AppError> {
    session.run(|engine| engine.reject_completion(id, &actor, reason.as_deref()))?;
    println!("Task {id} sent back.");
    Ok(())
}

pub fn cmd_delete(session: &mut Session, id: TaskId) -> Result<(), AppError> {
    let count = session
        .run(|engine| engine.get_task(id))
        .map(|tree| tree.ids().len())
        .unwrap_or(0);
    if session.run(|engine| engine.delete_task(id))? {
        println!("Deleted task {id} ({count} task(s) in subtree).");
    } else {
        println!("Task {id} not found.");
    }
    Ok(())
}

fn print_tree(tree: &TaskTree, depth: usize) {
    for item in &tree.items {
        println!(
            "{}* {} [{}] {:.1}% w={} (item #{})",
            "  ".repeat(depth),
            item.title,
            item.status,
            item.progress(),
            item.weight(),
            item.id
        );
    }
    for sub in &tree.subtasks {
        let t = &sub.task;
        println!(
            "{}- {} [{}] {:.1}% w={} (#{})",
            "  ".repeat(depth),
            t.title,
            t.status,
            t.progress(),
            t.weight(),
            t.id
        );
        print_tree(sub, depth + 1);
    }
}

pub fn cmd_view(
    session: &mut Session,
    id: TaskId,
    format: ViewFormat,
    parents: bool,
) -> Result<(), AppError> {
    let tree = session.run(|engine| engine.get_task(id))?;
    if format == ViewFormat::Json {
        let json = serde_json::to_string_pretty(&tree)
            .map_err(|e| AppError::Usage(format!("cannot encode task {id}: {e}")))?;
        println!("{json}");
        return Ok(());
    }
    let task = &tree.task;
    let today = Local::now().date_naive();
    let project = session
        .db()
        .assignments
        .iter()
        .find(|a| a.id == task.assignment_id)
        .and_then(|a| session.db().project(a.project_id))
        .map_or_else(|| "-".into(), |p| p.name.clone());
    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Project:      {project}");
    println!("Status:       {}", task.status);
    println!("Weight:       {}", task.weight());
    println!("Progress:     {:.1}%", task.progress());
    println!("Leaf:         {}", if task.is_leaf() { "yes" } else { "no" });
    println!("Assignee:     {}", task.assigned_member.as_deref().unwrap_or("-"));
    println!("Assigned by:  {}", task.assigned_by.as_deref().unwrap_or("-"));
    println!("Start:        {}", task.start_date.map_or_else(|| "-".into(), |d| d.to_string()));
    println!(
        "Due:          {}",
        match task.due {
            Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!("Hours:        {:.1} est / {:.1} actual", task.estimated_hours(), task.actual_hours());
    println!("Parent:       {}", task.parent.map_or_else(|| "-".into(), |p| p.to_string()));
    if let Some(reason) = &task.rejection_reason {
        println!("Rejected:     {reason}");
    }
    let next: Vec<&str> = allowed_transitions(task.status, task.is_leaf())
        .into_iter()
        .map(|t| t.verb())
        .collect();
    println!("Next:         {}", if next.is_empty() { "-".into() } else { next.join(", ") });
    println!("Created UTC:  {}", format_utc(task.created_at_utc));
    println!("Updated UTC:  {}", format_utc(task.updated_at_utc));
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    if parents {
        let chain = tree::ancestors(&mut UnitOfWork::new(session.db()), id);
        if chain.is_empty() {
            println!("Ancestors: -");
        } else {
            println!(
                "Ancestors (closest first): {}",
                chain.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" -> ")
            );
        }
    }
    if tree.subtasks.is_empty() && tree.items.is_empty() {
        println!("Children: -");
    } else {
        println!("Children:");
        print_tree(&tree, 1);
    }
    Ok(())
}

pub fn cmd_list(
    session: &mut Session,
    project: Option<String>,
    assignee: Option<String>,
    tree: bool,
) -> Result<(), AppError> {
    let db = session.db();
    let mut tasks = match project {
        Some(p) => db.tasks_in_project(resolve_project(db, &p)?),
        None => db.tasks.iter().collect(),
    };
    if let Some(member) = assignee.as_deref() {
        tasks.retain(|t| t.is_assigned_to(member));
    }
    if tree {
        // Pre-order over the forest so children print below their parent.
        let mut ordered = Vec::with_capacity(tasks.len());
        let mut stack: Vec<&Task> = tasks
            .iter()
            .copied()
            .filter(|t| t.parent.map_or(true, |p| !tasks.iter().any(|o| o.id == p)))
            .rev()
            .collect();
        while let Some(t) = stack.pop() {
            ordered.push(t);
            stack.extend(tasks.iter().copied().filter(|c| c.parent == Some(t.id)).rev());
        }
        print_table(&ordered, true);
    } else {
        tasks.sort_by_key(|t| (t.due.unwrap_or(NaiveDate::MAX), t.id));
        print_table(&tasks, false);
    }
    Ok(())
}

pub fn cmd_recompute(session: &mut Session, id: TaskId) -> Result<(), AppError> {
    let task = session.run(|engine| engine.recompute_progress(id))?;
    println!(
        "Task {}: weight {}, progress {:.1}%.",
        task.id,
        task.weight(),
        task.progress()
    );
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Entity;
    use crate::notify::LogSink;

    fn session(dir: &tempfile::TempDir) -> Session {
        Session {
            store: JsonStore::open(&dir.path().join("tree.json")).unwrap(),
            sink: Box::new(LogSink),
            config: EngineConfig::default(),
        }
    }

    fn fields(weight: u32) -> TaskFields {
        TaskFields {
            weight,
            desc: None,
            start: None,
            due: None,
            assignee: None,
            estimate: None,
            auto_todo: false,
        }
    }

    fn seat(s: &mut Session, project: &str, member: &str, role: Role) {
        let action = MemberAction::Add {
            project: project.into(),
            member: member.into(),
            role,
        };
        cmd_member(s, action).unwrap();
    }

    fn apollo(s: &mut Session) {
        let action = ProjectAction::Add { name: "Apollo".into(), department: None };
        cmd_project(s, action).unwrap();
    }

    #[test]
    fn test_commands_persist_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&dir);
        apollo(&mut s);
        seat(&mut s, "apollo", "lead", Role::TeamLead);
        seat(&mut s, "1", "ana", Role::Contributor);
        cmd_add(&mut s, "Launch".into(), "Apollo".into(), "lead".into(), fields(100)).unwrap();
        cmd_subtask(&mut s, 1, "Design".into(), fields(60)).unwrap();
        cmd_assign(&mut s, 2, Some("ana".into()), "lead".into()).unwrap();
        cmd_accept(&mut s, 2, "ana".into()).unwrap();
        cmd_progress(&mut s, 2, 50.0, "ana".into()).unwrap();

        let reopened = session(&dir);
        let root = reopened.db().get(1).unwrap();
        assert_eq!(root.weight(), 60);
        assert_eq!(root.progress(), 50.0);
    }

    #[test]
    fn test_member_edit_of_weight_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&dir);
        apollo(&mut s);
        seat(&mut s, "1", "lead", Role::TeamLead);
        seat(&mut s, "1", "ana", Role::Contributor);
        cmd_add(&mut s, "Launch".into(), "1".into(), "lead".into(), fields(100)).unwrap();
        let reweigh = || TaskChanges { weight: Some(50), ..TaskChanges::default() };
        let as_member = cmd_update(&mut s, 1, "ana".into(), reweigh());
        assert!(matches!(as_member, Err(AppError::Engine(EngineError::NotAuthorized { .. }))));
        cmd_update(&mut s, 1, "lead".into(), reweigh()).unwrap();
        let clear = TaskChanges {
            clear_due: true,
            title: Some("Liftoff".into()),
            ..TaskChanges::default()
        };
        cmd_update(&mut s, 1, "ana".into(), clear).unwrap_err();
        assert_eq!(s.db().get(1).unwrap().weight(), 50);
    }

    #[test]
    fn test_outsider_cannot_add_root_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&dir);
        apollo(&mut s);
        let outsider = cmd_add(&mut s, "Launch".into(), "Apollo".into(), "gus".into(), fields(10));
        assert!(matches!(outsider, Err(AppError::Engine(EngineError::NotAMember { .. }))));
        assert!(matches!(
            cmd_add(&mut s, "Launch".into(), "Nope".into(), "gus".into(), fields(10)),
            Err(AppError::Usage(_))
        ));
        let err = parse_date("due", Some("someday".into())).unwrap_err();
        assert_eq!(err.to_string(), "invalid due date 'someday'");
        assert!(matches!(
            s.run(|engine| engine.get_task(9)),
            Err(AppError::Engine(EngineError::NotFound { entity: Entity::Task, .. }))
        ));
    }
}
