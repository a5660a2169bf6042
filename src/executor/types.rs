// Data types for Executor module
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Key under which the status is stored in a status info mapping
pub const STATUS_KEY: &str = "STATUS";

/// Keyword arguments for a task function
pub type Kwargs = serde_json::Map<String, Value>;

/// Arbitrary info mapping passed to `get_status` and `cancel`
pub type StatusInfo = HashMap<String, Value>;

/// Sending half of the status channel owned by the host
pub type StatusSender = mpsc::UnboundedSender<StatusUpdate>;

/// Lifecycle state of one task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    /// Terminal states have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::NotStarted, Status::Running | Status::Cancelled) => true,
            (Status::Running, Status::Completed | Status::Failed | Status::Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "NOT_STARTED",
            Status::Running => "RUNNING",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Build a status info mapping holding only this status
    pub fn to_info(&self) -> StatusInfo {
        HashMap::from([(STATUS_KEY.to_string(), Value::from(self.as_str()))])
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one task within one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub dispatch_id: String,
    pub node_id: i64,
}

impl TaskMetadata {
    pub fn new(dispatch_id: impl Into<String>, node_id: i64) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            node_id,
        }
    }

    /// Extract metadata from a status info mapping, if both keys are present
    pub fn from_info(info: &StatusInfo) -> Option<Self> {
        let dispatch_id = match info.get("dispatch_id")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let node_id = info.get("node_id")?.as_i64()?;
        Some(Self::new(dispatch_id, node_id))
    }

    pub fn to_info(&self) -> StatusInfo {
        HashMap::from([
            ("dispatch_id".to_string(), Value::from(self.dispatch_id.clone())),
            ("node_id".to_string(), Value::from(self.node_id)),
        ])
    }
}

/// Status update pushed from executor to host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub metadata: TaskMetadata,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

/// Error returned by a task function
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub cause: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// Why a task produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task function returned an error
    Execution,
    /// The task function panicked
    Panic,
    /// The task function returned null
    NoResult,
    /// The result transform failed
    PostProcess,
    /// The invocation exceeded its time limit
    Timeout,
    /// The host cancelled the task
    Cancelled,
}

/// Structured failure held in the exception slot of an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    pub cause: Option<String>,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "task was cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }
}

impl From<TaskError> for TaskFailure {
    fn from(err: TaskError) -> Self {
        Self {
            kind: FailureKind::Execution,
            message: err.message,
            cause: err.cause,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

/// Positional form of an output: (result, stdout, stderr, exception)
pub type OutputParts = (Option<Value>, String, String, Option<TaskFailure>);

/// Result envelope returned by execute and cancel
///
/// Holds either a value or a failure, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    outcome: Result<Value, TaskFailure>,
    stdout: String,
    stderr: String,
}

impl ExecutionOutput {
    pub fn success(value: Value, stdout: String, stderr: String) -> Self {
        Self {
            outcome: Ok(value),
            stdout,
            stderr,
        }
    }

    pub fn failure(failure: TaskFailure, stdout: String, stderr: String) -> Self {
        Self {
            outcome: Err(failure),
            stdout,
            stderr,
        }
    }

    /// Output for a cancelled task: no result, no logs
    pub fn cancelled() -> Self {
        Self::failure(TaskFailure::cancelled(), String::new(), String::new())
    }

    pub fn outcome(&self) -> Result<&Value, &TaskFailure> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        self.outcome.as_ref().err()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Terminal status this output corresponds to
    pub fn status(&self) -> Status {
        match &self.outcome {
            Ok(_) => Status::Completed,
            Err(f) if f.is_cancelled() => Status::Cancelled,
            Err(_) => Status::Failed,
        }
    }

    pub fn into_parts(self) -> OutputParts {
        let (result, error) = match self.outcome {
            Ok(v) => (Some(v), None),
            Err(f) => (None, Some(f)),
        };
        (result, self.stdout, self.stderr, error)
    }
}

/// Constraints for a single execution
#[derive(Debug, Clone)]
pub struct ExecutionConstraints {
    /// Maximum execution time in seconds (0 disables the limit)
    pub timeout_secs: u64,
    /// Maximum captured size in bytes, per stream
    pub max_output_bytes: usize,
}

impl ExecutionConstraints {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ExecutionConstraints {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            max_output_bytes: 1048576, // 1MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(Status::NotStarted).unwrap(), json!("NOT_STARTED"));
        let status: Status = serde_json::from_value(json!("RUNNING")).unwrap();
        assert_eq!(status, Status::Running);
        assert_eq!(Status::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_status_transitions() {
        assert!(Status::NotStarted.can_transition_to(Status::Running));
        assert!(Status::NotStarted.can_transition_to(Status::Cancelled));
        assert!(Status::Running.can_transition_to(Status::Completed));
        assert!(Status::Running.can_transition_to(Status::Failed));
        assert!(Status::Running.can_transition_to(Status::Cancelled));

        assert!(!Status::NotStarted.can_transition_to(Status::Completed));
        for terminal in [Status::Completed, Status::Failed, Status::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Status::Running));
            assert!(!terminal.can_transition_to(Status::Completed));
            assert!(!terminal.can_transition_to(Status::Failed));
        }
    }

    #[test]
    fn test_output_parts_success() {
        let output = ExecutionOutput::success(json!(10), "out".into(), String::new());
        assert_eq!(output.status(), Status::Completed);

        let (result, stdout, stderr, error) = output.into_parts();
        assert_eq!(result, Some(json!(10)));
        assert_eq!(stdout, "out");
        assert_eq!(stderr, "");
        assert!(error.is_none());
    }

    #[test]
    fn test_output_parts_cancelled() {
        let output = ExecutionOutput::cancelled();
        assert_eq!(output.status(), Status::Cancelled);

        let (result, stdout, stderr, error) = output.into_parts();
        assert!(result.is_none());
        assert!(stdout.is_empty() && stderr.is_empty());
        assert!(error.unwrap().is_cancelled());
    }

    #[test]
    fn test_task_error_into_failure() {
        let failure: TaskFailure = TaskError::new("boom").with_cause("disk full").into();
        assert_eq!(failure.kind, FailureKind::Execution);
        assert_eq!(failure.message, "boom");
        assert_eq!(failure.cause.as_deref(), Some("disk full"));
        assert_eq!(failure.to_string(), "Execution: boom (caused by: disk full)");
    }

    #[test]
    fn test_metadata_from_info() {
        let metadata = TaskMetadata::new("abc", 3);
        assert_eq!(TaskMetadata::from_info(&metadata.to_info()), Some(metadata));
        assert_eq!(TaskMetadata::from_info(&StatusInfo::new()), None);
    }
}
