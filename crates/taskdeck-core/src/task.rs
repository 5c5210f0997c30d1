use taskdeck_shared::{TaskDraft, TaskItem, TaskStatus, due_date_serde};

use crate::error::SyncError;

pub const MISSING_FIELDS: &str = "Task and due date required";
pub const BAD_DUE_DATE: &str = "Due date must be a calendar date (YYYY-MM-DD)";

/// Raw add-task input, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftForm {
    pub task: String,
    pub due_date: String,
}

impl DraftForm {
    pub fn new(task: impl Into<String>, due_date: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            due_date: due_date.into(),
        }
    }

    pub fn to_draft(&self) -> Result<TaskDraft, SyncError> {
        parse_draft(&self.task, &self.due_date)
    }

    pub fn reset(&mut self) {
        self.task.clear();
        self.due_date.clear();
    }
}

pub fn parse_draft(task: &str, due_date: &str) -> Result<TaskDraft, SyncError> {
    let task = task.trim();
    let due_date = due_date.trim();
    if task.is_empty() || due_date.is_empty() {
        return Err(SyncError::validation(MISSING_FIELDS));
    }

    let due = due_date_serde::parse(due_date).ok_or_else(|| SyncError::validation(BAD_DUE_DATE))?;
    Ok(TaskDraft::new(task, due))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub status: TaskStatus,
    pub items: Vec<TaskItem>,
}

/// Items grouped into one column per status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Board {
    pub fn from_items(items: &[TaskItem]) -> Self {
        let columns = TaskStatus::ALL
            .into_iter()
            .map(|status| Column {
                status,
                items: items
                    .iter()
                    .filter(|item| item.status == status)
                    .cloned()
                    .collect(),
            })
            .collect();
        Self { columns }
    }

    pub fn column(&self, status: TaskStatus) -> &[TaskItem] {
        self.columns
            .iter()
            .find(|column| column.status == status)
            .map(|column| column.items.as_slice())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|column| column.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
