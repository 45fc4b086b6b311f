//! Per-member protocols and the batch dispatcher that fans them out.
//!
//! A [`Protocol`] walks one item through the site on a session it is handed.
//! The [`Dispatcher`] owns sessions: it splits the items into lanes, gives each
//! lane one session, runs lanes concurrently, then re-runs whatever failed on
//! one fresh session.

use async_trait::async_trait;
use courtlot_core::{DispatchItem, ProtocolLog};
use courtlot_site::SiteSession;

pub mod apply;
pub mod dispatcher;
mod error;
pub mod result;
pub mod status;

pub use apply::{ApplyOptions, ApplyProtocol};
pub use dispatcher::{Dispatcher, ProgressFn, Report, Tally};
pub use error::ProtocolError;
pub use result::ConfirmResultProtocol;
pub use status::{StatusProtocol, StatusReport};

/// How one protocol run ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Completed(T),
    /// The site did not accept the member's credentials.
    LoginRejected,
}

#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    type Item: DispatchItem;
    type Output: Send + 'static;

    /// Log name for first-pass lane `lane` carrying `items`.
    fn lane_name(&self, lane: usize, items: &[Self::Item]) -> String;

    /// Log name for the retry pass.
    fn retry_name(&self) -> String;

    /// One line describing `item` for progress messages.
    fn describe(&self, item: &Self::Item) -> String {
        let member = item.member();
        format!("{} ({})", member.name, member.id)
    }

    async fn run(
        &self,
        session: &dyn SiteSession,
        item: &Self::Item,
        log: &dyn ProtocolLog,
    ) -> Result<Attempt<Self::Output>, ProtocolError>;
}
