use courtlot_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid lottery number range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("profile {0} has no lottery setting")]
    MissingSetting(String),
}
