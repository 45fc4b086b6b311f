//! Lottery configuration document.

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::distribute::TargetSpec;

/// The lottery month and the slots members should be spread across.
///
/// Court types are checked per target when work items are built, so one bad
/// target never invalidates the whole setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySetting {
    pub month: u32,
    pub targets: Vec<TargetSpec>,
}

impl LotterySetting {
    /// Document-level checks: month range and at least one target.
    pub fn check(&self) -> Result<(), ConfigError> {
        if !(1..=12).contains(&self.month) {
            return Err(ConfigError::InvalidMonth(self.month));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }
}
