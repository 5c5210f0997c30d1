use std::fmt;

use thiserror::Error;

/// Remote call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchAll,
    Create,
    UpdateStatus,
    DeleteOne,
    DeleteAll,
}

impl Operation {
    /// Generic text used when the server gives no message of its own.
    pub fn failure_text(self) -> &'static str {
        match self {
            Operation::FetchAll => "Failed to fetch todos",
            Operation::Create => "Failed to add todo",
            Operation::UpdateStatus => "Failed to update todo",
            Operation::DeleteOne => "Failed to delete todo",
            Operation::DeleteAll => "Failed to delete todos",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FetchAll => "fetch_all",
            Operation::Create => "create",
            Operation::UpdateStatus => "update_status",
            Operation::DeleteOne => "delete_one",
            Operation::DeleteAll => "delete_all",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Rejected on the client before anything was sent.
    #[error("{0}")]
    Validation(String),

    /// No response came back.
    #[error("{}: unable to reach server ({})", .operation.failure_text(), .detail)]
    Network { operation: Operation, detail: String },

    /// A response came back with a non-success status, or a success status
    /// with a body that does not match the expected schema.
    #[error("{}", server_text(.operation, .message))]
    Server {
        operation: Operation,
        status: u16,
        message: Option<String>,
    },
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            SyncError::Validation(_) => None,
            SyncError::Network { operation, .. } | SyncError::Server { operation, .. } => {
                Some(*operation)
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }

    pub fn is_server(&self) -> bool {
        matches!(self, SyncError::Server { .. })
    }
}

fn server_text(operation: &Operation, message: &Option<String>) -> String {
    match message {
        Some(msg) => format!("{}: {msg}", operation.failure_text()),
        None => operation.failure_text().to_string(),
    }
}
