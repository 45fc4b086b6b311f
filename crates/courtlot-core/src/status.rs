//! Read-only projections of what the booking site holds for a member.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which listing a [`StatusRecord`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusKind {
    /// Lottery entries submitted and not yet drawn.
    PendingEntry,
    /// Won lottery results awaiting the member's confirmation.
    UnconfirmedResult,
    /// Confirmed reservations.
    Reservation,
}

impl StatusKind {
    pub const ALL: [StatusKind; 3] = [
        StatusKind::PendingEntry,
        StatusKind::UnconfirmedResult,
        StatusKind::Reservation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingEntry => "pending-entry",
            Self::UnconfirmedResult => "unconfirmed-result",
            Self::Reservation => "reservation",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub kind: StatusKind,
    pub member_id: String,
    pub member_name: String,
    pub court: String,
    pub date: String,
    pub time: String,
}

/// Everything the three listing pages show for one member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub pending: Vec<StatusRecord>,
    pub unconfirmed: Vec<StatusRecord>,
    pub reservations: Vec<StatusRecord>,
}

impl ApplicationStatus {
    pub fn records(&self, kind: StatusKind) -> &[StatusRecord] {
        match kind {
            StatusKind::PendingEntry => &self.pending,
            StatusKind::UnconfirmedResult => &self.unconfirmed,
            StatusKind::Reservation => &self.reservations,
        }
    }

    pub fn push(&mut self, record: StatusRecord) {
        match record.kind {
            StatusKind::PendingEntry => self.pending.push(record),
            StatusKind::UnconfirmedResult => self.unconfirmed.push(record),
            StatusKind::Reservation => self.reservations.push(record),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.unconfirmed.is_empty() && self.reservations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: StatusKind) -> StatusRecord {
        StatusRecord {
            kind,
            member_id: "10001".into(),
            member_name: "Sato".into(),
            court: "日比谷公園".into(),
            date: "2026/11/3".into(),
            time: "9:00-11:00".into(),
        }
    }

    #[test]
    fn push_routes_by_kind() {
        let mut status = ApplicationStatus::default();
        assert!(status.is_empty());
        for kind in StatusKind::ALL {
            status.push(record(kind));
        }
        status.push(record(StatusKind::Reservation));
        assert_eq!(status.records(StatusKind::PendingEntry).len(), 1);
        assert_eq!(status.records(StatusKind::UnconfirmedResult).len(), 1);
        assert_eq!(status.records(StatusKind::Reservation).len(), 2);
    }

    #[test]
    fn kind_serialises_kebab_case() {
        let json = serde_json::to_string(&StatusKind::UnconfirmedResult).unwrap();
        assert_eq!(json, r#""unconfirmed-result""#);
    }
}
