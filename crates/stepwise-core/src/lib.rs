pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::StepwiseConfig;
pub use error::{BoxError, Result, StepwiseError};
pub use event::EventBus;
pub use traits::{EventEmitter, SchemaValidator, ValidationFailure};
pub use types::*;
