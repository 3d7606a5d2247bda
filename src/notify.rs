//! Notification sink boundary.
//!
//! The engine fires one notification per affected member on every assignment, status
//! and due-date change, after its changes are committed. Delivery failures are logged and
//! reported back to the caller; nothing is retried.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fields::Entity;
use crate::task::MemberId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: MemberId,
    pub subject: String,
    pub body: String,
    pub entity: Entity,
    pub entity_id: u64,
}

impl Notification {
    pub fn new(
        recipient: impl Into<MemberId>,
        subject: impl Into<String>,
        body: impl Into<String>,
        entity: Entity,
        entity_id: u64,
    ) -> Self {
        Notification {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            entity,
            entity_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("cannot write outbox {}: {source}", path.display())]
    Outbox {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

pub trait NotificationSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Emits notifications as log events.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %n.recipient,
            entity = %n.entity,
            entity_id = n.entity_id,
            subject = %n.subject,
            "{}",
            n.body
        );
        Ok(())
    }
}

/// Appends notifications to a JSON-lines file for an in-app inbox to pick up.
#[derive(Debug)]
pub struct OutboxSink {
    path: PathBuf,
}

impl OutboxSink {
    pub fn new(path: &Path) -> Self {
        OutboxSink {
            path: path.to_path_buf(),
        }
    }
}

impl NotificationSink for OutboxSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        if n.recipient.trim().is_empty() {
            return Err(NotifyError::Rejected("notification has no recipient".into()));
        }
        let mut line = serde_json::to_string(n)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|source| NotifyError::Outbox {
                path: self.path.clone(),
                source,
            })
    }
}

/// Keeps every notification in memory; optionally refuses one recipient.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: std::cell::RefCell<Vec<Notification>>,
    refuse: Option<MemberId>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn refusing(recipient: &str) -> Self {
        RecordingSink {
            sent: Default::default(),
            refuse: Some(recipient.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.borrow().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<Notification> {
        self.sent
            .borrow()
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        if self.refuse.as_deref() == Some(n.recipient.as_str()) {
            return Err(NotifyError::Rejected(format!("inbox of '{}' is closed", n.recipient)));
        }
        self.sent.borrow_mut().push(n.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let sink = OutboxSink::new(&path);
        let assigned = Notification::new("ana", "Task assigned", "yours", Entity::Task, 1);
        let deleted = Notification::new("bo", "Task deleted", "gone", Entity::Task, 2);
        sink.notify(&assigned).unwrap();
        sink.notify(&deleted).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Notification> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].recipient, "ana");
        assert_eq!(lines[1].entity_id, 2);
    }

    #[test]
    fn test_outbox_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutboxSink::new(&dir.path().join("missing").join("outbox.jsonl"));
        let err = sink
            .notify(&Notification::new("ana", "s", "b", Entity::Task, 1))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Outbox { .. }));
    }

    #[test]
    fn test_outbox_refuses_blank_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let err = OutboxSink::new(&path)
            .notify(&Notification::new(" ", "s", "b", Entity::Task, 1))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(_)));
        assert!(!path.exists());
    }
}
