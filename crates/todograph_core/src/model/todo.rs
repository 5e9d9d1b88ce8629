//! Todo domain model.
//!
//! # Responsibility
//! - Define the canonical schedulable node and its interval.
//! - Provide creation and patch payloads consumed by the coordinator.
//!
//! # Invariants
//! - `id` is stable and never reused for another todo.
//! - `name` is non-blank after trim.
//! - `end_date` is never earlier than `start_date`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Stable identifier for every todo node.
pub type TodoId = Uuid;

/// Owning project reference. Opaque to the engine.
pub type ProjectId = Uuid;

/// Display tag assigned when callers do not pick one.
pub const DEFAULT_COLOR: &str = "primary.main";

/// Calendar unit used to seed repeated child todos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPeriod {
    Day,
    #[default]
    Week,
    Month,
    Year,
}

impl RepeatPeriod {
    /// Average length of one period.
    ///
    /// Months and years use Gregorian averages (30.436875 and 365.2425 days).
    pub fn length(self) -> Duration {
        match self {
            Self::Day => Duration::DAY,
            Self::Week => Duration::WEEK,
            Self::Month => Duration::seconds(2_629_746),
            Self::Year => Duration::seconds(31_556_952),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// Closed time interval `[start_date, end_date]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
}

impl Interval {
    pub fn new(start_date: OffsetDateTime, end_date: OffsetDateTime) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// Moves both bounds by `delta`, keeping the length. `None` when either
    /// bound leaves the representable date range.
    pub fn checked_shift(self, delta: Duration) -> Option<Self> {
        Some(Self {
            start_date: self.start_date.checked_add(delta)?,
            end_date: self.end_date.checked_add(delta)?,
        })
    }

    pub fn length(self) -> Duration {
        self.end_date - self.start_date
    }

    pub fn is_ordered(self) -> bool {
        self.end_date >= self.start_date
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            format_date(self.start_date),
            format_date(self.end_date)
        )
    }
}

/// Formats a timestamp as RFC 3339 for messages and logs.
pub fn format_date(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Model-level shape errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoValidationError {
    NilId,
    BlankName,
    InvalidInterval {
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
    },
}

impl Display for TodoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "todo id must not be nil"),
            Self::BlankName => write!(f, "todo name must not be blank"),
            Self::InvalidInterval {
                start_date,
                end_date,
            } => write!(
                f,
                "end_date ({}) must be >= start_date ({})",
                format_date(*end_date),
                format_date(*start_date)
            ),
        }
    }
}

impl Error for TodoValidationError {}

/// Canonical schedulable node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TodoRecord")]
pub struct Todo {
    pub id: TodoId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    /// `true` once the todo is done.
    pub status: bool,
    pub repeat: bool,
    pub repeat_period: RepeatPeriod,
    pub repeat_times: u32,
    pub instance_time_span: u32,
    pub color: String,
}

impl Todo {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_date, self.end_date)
    }

    pub fn set_interval(&mut self, interval: Interval) {
        self.start_date = interval.start_date;
        self.end_date = interval.end_date;
    }

    /// Validates shape invariants that do not depend on graph position.
    pub fn validate(&self) -> Result<(), TodoValidationError> {
        if self.id.is_nil() {
            return Err(TodoValidationError::NilId);
        }
        if self.name.trim().is_empty() {
            return Err(TodoValidationError::BlankName);
        }
        if !self.interval().is_ordered() {
            return Err(TodoValidationError::InvalidInterval {
                start_date: self.start_date,
                end_date: self.end_date,
            });
        }
        Ok(())
    }
}

/// Wire shape used to reject invalid todos during deserialization.
#[derive(Deserialize)]
struct TodoRecord {
    id: TodoId,
    project_id: ProjectId,
    name: String,
    description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end_date: OffsetDateTime,
    status: bool,
    repeat: bool,
    repeat_period: RepeatPeriod,
    repeat_times: u32,
    instance_time_span: u32,
    color: String,
}

impl TryFrom<TodoRecord> for Todo {
    type Error = TodoValidationError;

    fn try_from(value: TodoRecord) -> Result<Self, Self::Error> {
        let todo = Todo {
            id: value.id,
            project_id: value.project_id,
            name: value.name,
            description: value.description,
            start_date: value.start_date,
            end_date: value.end_date,
            status: value.status,
            repeat: value.repeat,
            repeat_period: value.repeat_period,
            repeat_times: value.repeat_times,
            instance_time_span: value.instance_time_span,
            color: value.color,
        };
        todo.validate()?;
        Ok(todo)
    }
}

fn default_instance_time_span() -> u32 {
    1
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// Attribute payload for creating one todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    /// Caller-provided identity for import paths. Generated when absent.
    #[serde(default)]
    pub id: Option<TodoId>,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub repeat_period: RepeatPeriod,
    #[serde(default)]
    pub repeat_times: u32,
    #[serde(default = "default_instance_time_span")]
    pub instance_time_span: u32,
    #[serde(default = "default_color")]
    pub color: String,
}

impl NewTodo {
    /// Creates a payload with default status, repeat metadata and color.
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
    ) -> Self {
        Self {
            id: None,
            project_id,
            name: name.into(),
            description: None,
            start_date,
            end_date,
            status: false,
            repeat: false,
            repeat_period: RepeatPeriod::default(),
            repeat_times: 0,
            instance_time_span: default_instance_time_span(),
            color: default_color(),
        }
    }

    /// Materializes the node, generating an id when none was supplied.
    pub fn into_todo(self) -> Todo {
        Todo {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            project_id: self.project_id,
            name: self.name.trim().to_string(),
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            repeat: self.repeat,
            repeat_period: self.repeat_period,
            repeat_times: self.repeat_times,
            instance_time_span: self.instance_time_span,
            color: self.color,
        }
    }
}

/// Partial attribute update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub status: Option<bool>,
    pub project_id: Option<ProjectId>,
    pub repeat: Option<bool>,
    pub repeat_period: Option<RepeatPeriod>,
    pub repeat_times: Option<u32>,
    pub instance_time_span: Option<u32>,
    pub color: Option<String>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns `todo` with every provided field replaced.
    pub fn apply_to(&self, todo: &Todo) -> Todo {
        let mut next = todo.clone();
        if let Some(name) = &self.name {
            next.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(start_date) = self.start_date {
            next.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            next.end_date = end_date;
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(project_id) = self.project_id {
            next.project_id = project_id;
        }
        if let Some(repeat) = self.repeat {
            next.repeat = repeat;
        }
        if let Some(repeat_period) = self.repeat_period {
            next.repeat_period = repeat_period;
        }
        if let Some(repeat_times) = self.repeat_times {
            next.repeat_times = repeat_times;
        }
        if let Some(instance_time_span) = self.instance_time_span {
            next.instance_time_span = instance_time_span;
        }
        if let Some(color) = &self.color {
            next.color = color.clone();
        }
        next
    }
}
