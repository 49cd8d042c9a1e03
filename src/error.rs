use thiserror::Error;

/// Errors surfaced to library consumers.
///
/// Resolution failure is not among them: a leaf returning `false` rewinds the
/// thread, and running out of choice points is reported as "no solution".
#[derive(Error, Debug)]
pub enum ClausalError {
    #[error("Arg '{name}' is already bound")]
    AlreadyBound { name: String },
    #[error("Construction error: {0}")]
    Construction(String),
    #[error("Predicate '{predicate}' wrote undeclared field '{field}'")]
    UndeclaredField { predicate: String, field: String },
    #[error("Predicate '{predicate}' is asynchronous; use run_async")]
    Suspended { predicate: String },
    #[error("Asynchronous predicate '{predicate}' was rejected: {message}")]
    Rejected { predicate: String, message: String },
    #[error("Thread was cancelled")]
    Cancelled,
    #[error("Thread exceeded its deadline")]
    TimedOut,
    #[error("Step limit of {limit} exceeded")]
    StepLimit { limit: u64 },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, ClausalError>;

// Helper conversions
impl From<::config::ConfigError> for ClausalError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for ClausalError {
    fn from(e: serde_json::Error) -> Self { Self::Construction(e.to_string()) }
}
