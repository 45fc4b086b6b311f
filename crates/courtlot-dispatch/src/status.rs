//! Application status: every listing page for every member.

use async_trait::async_trait;
use courtlot_core::{ApplicationStatus, Member, Outcome, ProtocolLog, RosterEntry, StatusKind, StatusRecord};
use courtlot_site::SiteSession;

use crate::{Attempt, Protocol, ProtocolError, Report};

/// Login and read the pending-entry, unconfirmed-result and reservation
/// listings.
#[derive(Debug, Clone, Default)]
pub struct StatusProtocol;

#[async_trait]
impl Protocol for StatusProtocol {
    type Item = RosterEntry;
    type Output = ApplicationStatus;

    fn lane_name(&self, lane: usize, _items: &[RosterEntry]) -> String {
        format!("checkStatus_{lane}")
    }

    fn retry_name(&self) -> String {
        "checkStatus_redo".to_string()
    }

    async fn run(
        &self,
        session: &dyn SiteSession,
        item: &RosterEntry,
        log: &dyn ProtocolLog,
    ) -> Result<Attempt<ApplicationStatus>, ProtocolError> {
        let member = &item.member;
        if !session.login(&member.id, &member.password).await? {
            return Ok(Attempt::LoginRejected);
        }
        log.info("logged in");

        let mut status = ApplicationStatus::default();
        for kind in StatusKind::ALL {
            let rows = session.read_listing(kind).await?;
            log.info(&format!("{kind}: {} rows", rows.len()));
            for row in rows {
                status.push(row.into_record(kind, member));
            }
        }

        session.logout().await?;
        log.info("logged out");
        Ok(Attempt::Completed(status))
    }
}

/// Status of a whole roster, flattened for display or export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub records: Vec<StatusRecord>,
    pub login_failed: Vec<Member>,
    /// Members whose status could not be read, with the last error.
    pub errors: Vec<(Member, String)>,
}

impl StatusReport {
    pub fn from_reports(reports: &[Report<RosterEntry, ApplicationStatus>]) -> Self {
        let mut out = Self::default();
        for report in reports {
            let member = &report.item.member;
            match &report.outcome {
                Outcome::Success(status) => {
                    for kind in StatusKind::ALL {
                        out.records.extend(status.records(kind).iter().cloned());
                    }
                }
                Outcome::LoginFailed => out.login_failed.push(member.clone()),
                Outcome::Error(detail) => out.errors.push((member.clone(), detail.clone())),
            }
        }
        out
    }

    pub fn records_of(&self, kind: StatusKind) -> impl Iterator<Item = &StatusRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }
}
