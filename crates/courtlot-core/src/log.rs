//! Human-readable step logging for protocol runs.
//!
//! Protocols narrate every site interaction through a [`ProtocolLog`]. The
//! dispatcher opens one log per lane (plus one for the retry pass) from a
//! [`LaneLogs`] factory, so each concurrent lane gets its own file.

use std::sync::Arc;

use tracing::{error, info, warn};

pub trait ProtocolLog: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Opens named lane logs. Opening the same name twice starts it afresh.
pub trait LaneLogs: Send + Sync {
    fn open(&self, name: &str) -> Arc<dyn ProtocolLog>;
}

/// Console-only lane log.
pub struct TracingLog {
    lane: String,
}

impl TracingLog {
    pub fn new(lane: impl Into<String>) -> Self {
        Self { lane: lane.into() }
    }
}

impl ProtocolLog for TracingLog {
    fn info(&self, message: &str) {
        info!(lane = %self.lane, "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(lane = %self.lane, "{message}");
    }

    fn error(&self, message: &str) {
        error!(lane = %self.lane, "{message}");
    }
}

pub struct TracingLogs;

impl LaneLogs for TracingLogs {
    fn open(&self, name: &str) -> Arc<dyn ProtocolLog> {
        Arc::new(TracingLog::new(name))
    }
}
