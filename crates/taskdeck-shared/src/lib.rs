use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};

/// Identifier of a task item. Server ids
/// are positive; ids handed out locally
/// before the server confirms a create
/// are negative.
pub type TaskId = i64;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  #[default]
  Backlog,
  Today,
  Tomorrow,
  InProgress,
  Done
}

impl TaskStatus {
  /// Board columns, in display order.
  pub const ALL: [TaskStatus; 5] = [
    TaskStatus::Backlog,
    TaskStatus::Today,
    TaskStatus::Tomorrow,
    TaskStatus::InProgress,
    TaskStatus::Done
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | TaskStatus::Backlog => "backlog",
      | TaskStatus::Today => "today",
      | TaskStatus::Tomorrow => "tomorrow",
      | TaskStatus::InProgress => {
        "in-progress"
      }
      | TaskStatus::Done => "done"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | TaskStatus::Backlog => "Backlog",
      | TaskStatus::Today => "Today",
      | TaskStatus::Tomorrow => "Tomorrow",
      | TaskStatus::InProgress => {
        "In progress"
      }
      | TaskStatus::Done => "Done"
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "unknown status '{}' (expected \
       one of backlog, today, \
       tomorrow, in-progress, done)",
      self.0
    )
  }
}

impl std::error::Error
  for ParseStatusError
{
}

impl FromStr for TaskStatus {
  type Err = ParseStatusError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "backlog" => Ok(Self::Backlog),
      | "today" => Ok(Self::Today),
      | "tomorrow" => Ok(Self::Tomorrow),
      | "in-progress"
      | "in_progress"
      | "inprogress" => {
        Ok(Self::InProgress)
      }
      | "done" => Ok(Self::Done),
      | _ => {
        Err(ParseStatusError(
          s.to_string()
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskItem {
  pub id:       TaskId,
  pub task:     String,
  #[serde(with = "due_date_serde")]
  pub due_date: NaiveDate,
  #[serde(default)]
  pub status:   TaskStatus
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskDraft {
  pub task:     String,
  #[serde(with = "due_date_serde")]
  pub due_date: NaiveDate
}

impl TaskDraft {
  pub fn new(
    task: impl Into<String>,
    due_date: NaiveDate
  ) -> Self {
    Self {
      task: task.into(),
      due_date
    }
  }
}

/// Body of `POST /todo`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct CreateTasksRequest {
  pub tasks: Vec<TaskDraft>
}

/// Body of `PATCH /todo/{id}`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct StatusPatch {
  pub status: TaskStatus
}

/// Shape of a failure body. Servers put
/// the human text in either field.
#[derive(
  Debug, Clone, Default, Deserialize,
)]
pub struct ErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error:   Option<String>
}

impl ErrorBody {
  pub fn text(&self) -> Option<&str> {
    [&self.message, &self.error]
      .into_iter()
      .flatten()
      .map(|s| s.trim())
      .find(|s| !s.is_empty())
  }
}

pub mod due_date_serde {
  use chrono::{
    DateTime,
    NaiveDate,
    NaiveDateTime
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const WIRE_FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date
        .format(WIRE_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    parse(&raw).ok_or_else(|| {
      serde::de::Error::custom(format!(
        "invalid due date '{raw}'"
      ))
    })
  }

  /// Accepts `YYYY-MM-DD` or a timestamp
  /// whose date part is kept.
  pub fn parse(
    raw: &str
  ) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) =
      NaiveDate::parse_from_str(
        raw,
        WIRE_FORMAT
      )
    {
      return Some(date);
    }
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(raw)
    {
      return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(
      raw,
      "%Y-%m-%dT%H:%M:%S%.f"
    )
    .ok()
    .map(|ndt| ndt.date())
  }
}
