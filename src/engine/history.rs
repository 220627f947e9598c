//! Undo/redo history as a linear command log.
//!
//! Entries are plain data so they can be inspected and tested without any
//! client runtime. The log is client-local and never checkpointed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StepStatus;

/// A reversible change to one step field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Change {
    Status { old: StepStatus, new: StepStatus },
    Notes {
        old: Option<String>,
        new: Option<String>,
    },
    Checked { old: bool, new: bool },
}

impl Change {
    /// The change that undoes this one
    pub fn inverse(&self) -> Change {
        match self {
            Change::Status { old, new } => Change::Status {
                old: *new,
                new: *old,
            },
            Change::Notes { old, new } => Change::Notes {
                old: new.clone(),
                new: old.clone(),
            },
            Change::Checked { old, new } => Change::Checked {
                old: *new,
                new: *old,
            },
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Change::Status { .. } => "status",
            Change::Notes { .. } => "notes",
            Change::Checked { .. } => "checked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub step_id: Uuid,
    #[serde(flatten)]
    pub change: Change,
    pub timestamp: DateTime<Utc>,
}

impl Command {
    pub fn new(step_id: Uuid, change: Change) -> Self {
        Self {
            step_id,
            change,
            timestamp: Utc::now(),
        }
    }
}

/// Linear stack with a cursor. `applied` counts entries currently in effect;
/// entries past it form the redo branch.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: Vec<Command>,
    applied: usize,
    max_entries: usize,
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            applied: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// Append a command, discarding any redo branch
    pub fn record(&mut self, command: Command) {
        self.entries.truncate(self.applied);
        self.entries.push(command);
        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
        self.applied = self.entries.len();
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    /// Command the next undo would revert
    pub fn peek_undo(&self) -> Option<&Command> {
        self.applied.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Command the next redo would re-apply
    pub fn peek_redo(&self) -> Option<&Command> {
        self.entries.get(self.applied)
    }

    /// Move the cursor back after the inverse was applied successfully
    pub fn step_back(&mut self) {
        self.applied = self.applied.saturating_sub(1);
    }

    /// Move the cursor forward after the command was re-applied successfully
    pub fn step_forward(&mut self) {
        if self.applied < self.entries.len() {
            self.applied += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.applied = 0;
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
