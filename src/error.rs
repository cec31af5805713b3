use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobqError {
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    #[error("worker pool exhausted")]
    PoolExhausted,

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobqError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobqError>;
