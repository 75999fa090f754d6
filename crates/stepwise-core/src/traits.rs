use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::WorkflowEvent;

/// Reason a value was rejected by a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<String>,
}

impl ValidationFailure {
    pub fn new(issues: Vec<String>) -> Self {
        Self { issues }
    }

    pub fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.issues.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// Checks a value against a JSON schema.
pub trait SchemaValidator: Send + Sync + 'static {
    /// Validate `value` against `schema`.
    ///
    /// Returns the accepted value, which may differ from the input when the
    /// validator fills in defaults.
    fn validate(
        &self,
        value: &serde_json::Value,
        schema: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ValidationFailure>;
}

/// Receives workflow lifecycle events.
pub trait EventEmitter: Send + Sync + 'static {
    /// Publish one event. Errors are reported to the caller but a run never
    /// aborts because of them.
    fn emit(&self, event: WorkflowEvent) -> BoxFuture<'_, Result<()>>;
}
