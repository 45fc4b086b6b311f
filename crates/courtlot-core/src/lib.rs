pub mod court;
pub mod distribute;
pub mod error;
pub mod log;
pub mod member;
pub mod outcome;
pub mod partition;
pub mod progress;
pub mod setting;
pub mod status;

pub use court::{Court, CourtType, VALID_COURT_TYPES};
pub use distribute::{Assignment, CourtSpec, LotteryTarget, TargetSpec, WorkItem, distribute};
pub use error::ConfigError;
pub use log::{LaneLogs, ProtocolLog, TracingLog, TracingLogs};
pub use member::{Member, Password, RosterEntry, roster};
pub use outcome::{DispatchItem, Outcome};
pub use partition::partition;
pub use progress::Progress;
pub use setting::LotterySetting;
pub use status::{ApplicationStatus, StatusKind, StatusRecord};
