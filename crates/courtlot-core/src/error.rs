use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid court type: {0:?}")]
    InvalidCourtType(String),

    #[error("start hour out of range: {0}")]
    InvalidStartHour(u8),

    #[error("month out of range: {0}")]
    InvalidMonth(u32),

    #[error("lottery setting has no targets")]
    NoTargets,
}
