use thiserror::Error;

/// Boxed error returned by step handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StepwiseError {
    // Definition errors
    #[error("Step '{name}' already exists in workflow")]
    DuplicateStep { name: String },

    #[error("Workflow has no steps")]
    EmptyWorkflow,

    #[error("Invalid step name: {0:?}")]
    InvalidStepName(String),

    // Run errors
    #[error("Schema validation failed{}: {}", step_suffix(.step), .issues.join("; "))]
    SchemaValidation {
        step: Option<String>,
        issues: Vec<String>,
    },

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Step '{step}' returned invalid signal: {signal}")]
    InvalidSignal { step: String, signal: String },

    #[error("Step '{step}' failed at iteration {iteration}: {source}")]
    StepFailed {
        step: String,
        iteration: usize,
        #[source]
        source: BoxError,
    },

    #[error("Workflow exceeded max iterations ({limit}) at step '{step}'")]
    MaxIterationsExceeded { limit: usize, step: String },

    #[error("Workflow run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn step_suffix(step: &Option<String>) -> String {
    match step {
        Some(name) => format!(" at step '{}'", name),
        None => String::new(),
    }
}

impl StepwiseError {
    /// Name of the step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::DuplicateStep { name } => Some(name),
            Self::SchemaValidation { step, .. } => step.as_deref(),
            Self::StepNotFound(name) => Some(name),
            Self::InvalidSignal { step, .. }
            | Self::StepFailed { step, .. }
            | Self::MaxIterationsExceeded { step, .. } => Some(step),
            _ => None,
        }
    }

    /// True for `Cancelled`, and for a handler failure whose cause is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::StepFailed { source, .. } => source
                .downcast_ref::<StepwiseError>()
                .is_some_and(StepwiseError::is_cancelled),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StepwiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_validation_message() {
        let err = StepwiseError::SchemaValidation {
            step: Some("fetch".into()),
            issues: vec!["missing 'url'".into(), "bad type".into()],
        };
        assert_eq!(
            err.to_string(),
            "Schema validation failed at step 'fetch': missing 'url'; bad type"
        );

        let err = StepwiseError::SchemaValidation {
            step: None,
            issues: vec!["not an object".into()],
        };
        assert_eq!(err.to_string(), "Schema validation failed: not an object");
        assert_eq!(err.step(), None);
    }

    #[test]
    fn test_step_failed_preserves_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = StepwiseError::StepFailed {
            step: "write".into(),
            iteration: 3,
            source: Box::new(cause),
        };
        assert_eq!(err.step(), Some("write"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "disk on fire");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_through_step_failure() {
        let err = StepwiseError::StepFailed {
            step: "wait".into(),
            iteration: 0,
            source: Box::new(StepwiseError::Cancelled),
        };
        assert!(err.is_cancelled());
        assert!(StepwiseError::Cancelled.is_cancelled());
    }
}
