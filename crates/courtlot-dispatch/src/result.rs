//! Lottery result confirmation.

use async_trait::async_trait;
use courtlot_core::{ProtocolLog, RosterEntry, StatusKind, StatusRecord};
use courtlot_site::SiteSession;

use crate::{Attempt, Protocol, ProtocolError};

/// Login, open the results page and confirm the first won result.
///
/// Succeeds with `None` when the member won nothing; that is not an error.
#[derive(Debug, Clone, Default)]
pub struct ConfirmResultProtocol;

#[async_trait]
impl Protocol for ConfirmResultProtocol {
    type Item = RosterEntry;
    type Output = Option<StatusRecord>;

    fn lane_name(&self, lane: usize, _items: &[RosterEntry]) -> String {
        format!("confirmResult_{lane}")
    }

    fn retry_name(&self) -> String {
        "confirmResult_redo".to_string()
    }

    async fn run(
        &self,
        session: &dyn SiteSession,
        item: &RosterEntry,
        log: &dyn ProtocolLog,
    ) -> Result<Attempt<Option<StatusRecord>>, ProtocolError> {
        let member = &item.member;
        if !session.login(&member.id, &member.password).await? {
            return Ok(Attempt::LoginRejected);
        }
        log.info("logged in");

        session.open_lottery_results().await?;
        let won = match session.read_lottery_result().await? {
            None => {
                log.info("no lottery won");
                None
            }
            Some(row) => {
                let record = row.into_record(StatusKind::UnconfirmedResult, member);
                log.info(&format!(
                    "won: {} {} {}",
                    record.court, record.date, record.time
                ));
                session.confirm_lottery_result().await?;
                log.info("result confirmed");
                Some(record)
            }
        };

        session.logout().await?;
        log.info("logged out");
        Ok(Attempt::Completed(won))
    }
}
