use chrono::NaiveDate;
use courtlot_browser::BrowserError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("no calendar cell for {date} at {hour}:00")]
    CellNotFound { date: NaiveDate, hour: u8 },

    #[error("unexpected page: {0}")]
    UnexpectedPage(String),
}
