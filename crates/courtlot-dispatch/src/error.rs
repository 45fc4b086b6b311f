use chrono::NaiveDate;
use courtlot_site::SiteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("{date} not on the calendar after {pages} week pages")]
    PaginationExhausted { date: NaiveDate, pages: u32 },

    #[error("protocol step panicked: {0}")]
    Panicked(String),
}
