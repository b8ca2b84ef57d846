use thiserror::Error;

#[derive(Error, Debug)]
pub enum BioGuardError {
    /// A required perception field was absent.
    #[error("perception rejected: missing field `{0}`")]
    MissingField(&'static str),

    /// A perception field was present but not understood.
    #[error("perception rejected: {0}")]
    InvalidPerception(String),

    /// Frame timestamp went backwards relative to the buffer.
    #[error("perception rejected: timestamp {got}ms precedes latest {latest}ms")]
    OutOfOrder { latest: u64, got: u64 },

    #[error("config error: {0}")]
    Config(String),

    /// The perception source could not be read.
    #[error("perception source error: {0}")]
    Source(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BioGuardError {
    /// Errors that reject a single frame but leave the sampling loop running.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            BioGuardError::MissingField(_)
                | BioGuardError::InvalidPerception(_)
                | BioGuardError::OutOfOrder { .. }
                | BioGuardError::Json(_)
        )
    }
}

pub type BioGuardResult<T> = Result<T, BioGuardError>;

/// Failure of one notification channel. Never fatal to the dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no caregiver contact configured")]
    NoContact,

    #[error("channel unavailable: {0}")]
    Unavailable(String),
}
