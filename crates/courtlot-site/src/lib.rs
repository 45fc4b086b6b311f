//! Session driver for the booking site.
//!
//! A [`SiteSession`] is one logged-in-or-not browser session speaking the
//! site's vocabulary: log in, open the lottery form, pick a court and a cell,
//! read the confirmation panel, read result and status listings. Protocols in
//! `courtlot-dispatch` are written against this trait only, so they run the
//! same against a real browser ([`BrowserSession`]) and against the scripted
//! in-memory site behind the `sim` feature.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use courtlot_core::{Court, Member, Password, StatusKind, StatusRecord};

pub mod cells;
mod driver;
mod error;
#[cfg(feature = "sim")]
pub mod sim;

pub use driver::{BrowserSession, BrowserSessionFactory};
pub use error::SiteError;

pub const DEFAULT_BASE_URL: &str = "https://kouen.sports.metro.tokyo.lg.jp/web/";

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    /// Bound on waits for UI state (spinners, dialogs, elements).
    pub ui_timeout: Duration,
    /// Bound on page navigations.
    pub load_timeout: Duration,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ui_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(60),
        }
    }
}

/// What the confirmation panel shows after a cell is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub court: String,
    pub date: String,
    pub time: String,
    /// Lottery entries the member may still use this month (0, 1 or 2).
    pub free_entries: u8,
}

/// One row of a result or status listing, as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRow {
    pub court: String,
    pub date: String,
    pub time: String,
}

impl SlotRow {
    pub fn new(court: impl Into<String>, date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            court: court.into(),
            date: date.into(),
            time: time.into(),
        }
    }

    pub fn into_record(self, kind: StatusKind, member: &Member) -> StatusRecord {
        StatusRecord {
            kind,
            member_id: member.id.clone(),
            member_name: member.name.clone(),
            court: self.court,
            date: self.date,
            time: self.time,
        }
    }
}

/// One browser session against the booking site.
///
/// Methods other than [`login`](SiteSession::login) and
/// [`close`](SiteSession::close) assume a logged-in member.
#[async_trait]
pub trait SiteSession: Send + Sync {
    /// `Ok(false)` when the site did not show the post-login news panel.
    async fn login(&self, member_id: &str, password: &Password) -> Result<bool, SiteError>;

    async fn logout(&self) -> Result<(), SiteError>;

    async fn open_lottery_application(&self) -> Result<(), SiteError>;

    /// Whether the court's quick-select button is on the lottery form.
    async fn has_favorite(&self, court: &Court) -> Result<bool, SiteError>;

    /// Register `court` as a favorite. Returns the facility that was picked.
    async fn register_favorite(&self, court: &Court) -> Result<String, SiteError>;

    async fn select_court(&self, court: &Court) -> Result<(), SiteError>;

    /// Whether the week on screen has a column for `date`.
    async fn date_column_visible(&self, date: NaiveDate) -> Result<bool, SiteError>;

    async fn next_week(&self) -> Result<(), SiteError>;

    async fn select_cell(&self, date: NaiveDate, hour: u8) -> Result<(), SiteError>;

    async fn submit_application(&self) -> Result<(), SiteError>;

    async fn read_confirmation(&self) -> Result<Confirmation, SiteError>;

    /// Pick the first free entry number and apply.
    async fn confirm_entry(&self) -> Result<(), SiteError>;

    /// Back to the calendar after an entry, keeping the court selected.
    async fn continue_application(&self) -> Result<(), SiteError>;

    async fn open_lottery_results(&self) -> Result<(), SiteError>;

    /// First won result, or `None` when the site says nothing was won.
    async fn read_lottery_result(&self) -> Result<Option<SlotRow>, SiteError>;

    async fn confirm_lottery_result(&self) -> Result<(), SiteError>;

    /// Navigate to the listing for `kind` and read all of its rows.
    async fn read_listing(&self, kind: StatusKind) -> Result<Vec<SlotRow>, SiteError>;

    /// Release the browser. Calling it twice is harmless.
    async fn close(&self) -> Result<(), SiteError>;
}

/// Opens fresh sessions, one browser instance each.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn SiteSession>, SiteError>;
}
