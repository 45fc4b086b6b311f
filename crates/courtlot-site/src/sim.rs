//! Scripted in-memory booking site.
//!
//! [`SimSite`] is both the world (accounts, favorites, entries, listings) and
//! the [`SessionFactory`] over it. Faults can be scripted per member and step,
//! launches can be made to fail, and every session open/close, login and
//! favorite registration is counted so tests can assert on them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate};
use courtlot_browser::BrowserError;
use courtlot_core::{Court, Password, StatusKind};

use crate::{Confirmation, SessionFactory, SiteError, SiteSession, SlotRow};

/// Lottery entries a member may hold at once.
const ENTRY_LIMIT: u8 = 2;

/// Site operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Login,
    Logout,
    OpenLottery,
    ProbeFavorite,
    RegisterFavorite,
    SelectCourt,
    ProbeDate,
    NextWeek,
    SelectCell,
    Submit,
    ReadConfirmation,
    ConfirmEntry,
    OpenResults,
    ReadResult,
    ConfirmResult,
    ReadListing,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default)]
struct Account {
    password: String,
    favorites: HashSet<String>,
    free_entries: u8,
    entries: Vec<SlotRow>,
    results: Vec<SlotRow>,
    listings: HashMap<StatusKind, Vec<SlotRow>>,
    logins: usize,
    registrations: usize,
}

#[derive(Debug)]
struct World {
    accounts: HashMap<String, Account>,
    /// First day of the week shown when the lottery form opens.
    calendar_start: NaiveDate,
    faults: HashMap<(String, Step), usize>,
    launch_failures: usize,
    step_delay: Duration,
    opened: usize,
    closed: usize,
    open_now: usize,
    peak_open: usize,
}

impl World {
    fn account(&mut self, id: &str) -> Result<&mut Account, SiteError> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| SiteError::UnexpectedPage(format!("no account {id}")))
    }

    /// Consume one scripted fault for `member` at `step`, if any.
    fn trip(&mut self, member: &str, step: Step) -> Result<(), SiteError> {
        match self.faults.get_mut(&(member.to_string(), step)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SiteError::Browser(BrowserError::Timeout {
                    what: format!("scripted fault at {step}"),
                    timeout: Duration::from_secs(30),
                }))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct SimSite {
    world: Arc<Mutex<World>>,
}

impl SimSite {
    pub fn new(calendar_start: NaiveDate) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                accounts: HashMap::new(),
                calendar_start,
                faults: HashMap::new(),
                launch_failures: 0,
                step_delay: Duration::ZERO,
                opened: 0,
                closed: 0,
                open_now: 0,
                peak_open: 0,
            })),
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Scripting ──

    pub fn add_account(&self, id: &str, password: &str) {
        self.world().accounts.insert(
            id.to_string(),
            Account {
                password: password.to_string(),
                free_entries: ENTRY_LIMIT,
                ..Account::default()
            },
        );
    }

    pub fn add_favorite(&self, id: &str, court_name: &str) {
        if let Some(a) = self.world().accounts.get_mut(id) {
            a.favorites.insert(court_name.to_string());
        }
    }

    pub fn set_free_entries(&self, id: &str, free: u8) {
        if let Some(a) = self.world().accounts.get_mut(id) {
            a.free_entries = free.min(ENTRY_LIMIT);
        }
    }

    pub fn add_result(&self, id: &str, row: SlotRow) {
        if let Some(a) = self.world().accounts.get_mut(id) {
            a.results.push(row);
        }
    }

    pub fn add_listing(&self, id: &str, kind: StatusKind, row: SlotRow) {
        if let Some(a) = self.world().accounts.get_mut(id) {
            a.listings.entry(kind).or_default().push(row);
        }
    }

    /// Fail the next `times` runs of `step` for member `id`.
    pub fn fail(&self, id: &str, step: Step, times: usize) {
        self.world().faults.insert((id.to_string(), step), times);
    }

    /// Fail the next `times` session launches.
    pub fn fail_launches(&self, times: usize) {
        self.world().launch_failures = times;
    }

    /// Sleep this long at the start of every site operation.
    pub fn set_step_delay(&self, delay: Duration) {
        self.world().step_delay = delay;
    }

    // ── Observation ──

    pub fn sessions_opened(&self) -> usize {
        self.world().opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.world().closed
    }

    /// Most sessions that were open at the same time.
    pub fn peak_open_sessions(&self) -> usize {
        self.world().peak_open
    }

    pub fn login_attempts(&self, id: &str) -> usize {
        self.world().accounts.get(id).map_or(0, |a| a.logins)
    }

    pub fn favorite_registrations(&self, id: &str) -> usize {
        self.world().accounts.get(id).map_or(0, |a| a.registrations)
    }

    pub fn entries(&self, id: &str) -> Vec<SlotRow> {
        self.world()
            .accounts
            .get(id)
            .map(|a| a.entries.clone())
            .unwrap_or_default()
    }

    pub fn reservations(&self, id: &str) -> Vec<SlotRow> {
        self.world()
            .accounts
            .get(id)
            .and_then(|a| a.listings.get(&StatusKind::Reservation).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionFactory for SimSite {
    async fn open(&self) -> Result<Box<dyn SiteSession>, SiteError> {
        let delay = self.world().step_delay;
        tokio::time::sleep(delay).await;
        let mut world = self.world();
        if world.launch_failures > 0 {
            world.launch_failures -= 1;
            return Err(BrowserError::Launch("scripted launch failure".into()).into());
        }
        world.opened += 1;
        world.open_now += 1;
        world.peak_open = world.peak_open.max(world.open_now);
        Ok(Box::new(SimSession {
            site: self.clone(),
            page: Mutex::new(SimPage::default()),
        }))
    }
}

// ── Session ──

#[derive(Debug, Default)]
struct SimPage {
    user: Option<String>,
    week: u64,
    court: Option<String>,
    cell: Option<(NaiveDate, u8)>,
    submitted: bool,
    closed: bool,
}

struct SimSession {
    site: SimSite,
    page: Mutex<SimPage>,
}

impl SimSession {
    fn page(&self) -> MutexGuard<'_, SimPage> {
        self.page.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        let delay = self.site.world().step_delay;
        tokio::time::sleep(delay).await;
    }

    /// Logged-in member id, after consuming any fault scripted for `step`.
    fn enter(&self, step: Step) -> Result<String, SiteError> {
        let user = self
            .page()
            .user
            .clone()
            .ok_or_else(|| SiteError::UnexpectedPage("not logged in".into()))?;
        self.site.world().trip(&user, step)?;
        Ok(user)
    }

    fn visible_week(&self, world: &World) -> (NaiveDate, NaiveDate) {
        let first = world
            .calendar_start
            .checked_add_days(Days::new(self.page().week * 7))
            .unwrap_or(NaiveDate::MAX);
        let last = first.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
        (first, last)
    }
}

#[async_trait]
impl SiteSession for SimSession {
    async fn login(&self, member_id: &str, password: &Password) -> Result<bool, SiteError> {
        self.pause().await;
        let mut world = self.site.world();
        world.trip(member_id, Step::Login)?;
        let Some(account) = world.accounts.get_mut(member_id) else {
            return Ok(false);
        };
        account.logins += 1;
        if account.password != password.expose() {
            return Ok(false);
        }
        self.page().user = Some(member_id.to_string());
        Ok(true)
    }

    async fn logout(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::Logout)?;
        *self.page() = SimPage::default();
        Ok(())
    }

    async fn open_lottery_application(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::OpenLottery)?;
        let mut page = self.page();
        page.week = 0;
        page.court = None;
        page.cell = None;
        page.submitted = false;
        Ok(())
    }

    async fn has_favorite(&self, court: &Court) -> Result<bool, SiteError> {
        self.pause().await;
        let user = self.enter(Step::ProbeFavorite)?;
        let mut world = self.site.world();
        Ok(world.account(&user)?.favorites.contains(&court.name))
    }

    async fn register_favorite(&self, court: &Court) -> Result<String, SiteError> {
        self.pause().await;
        let user = self.enter(Step::RegisterFavorite)?;
        let mut world = self.site.world();
        let account = world.account(&user)?;
        account.registrations += 1;
        account.favorites.insert(court.name.clone());
        Ok(format!("{} 庭球場", court.name))
    }

    async fn select_court(&self, court: &Court) -> Result<(), SiteError> {
        self.pause().await;
        let user = self.enter(Step::SelectCourt)?;
        let favorited = self
            .site
            .world()
            .account(&user)?
            .favorites
            .contains(&court.name);
        if !favorited {
            return Err(SiteError::UnexpectedPage(format!(
                "no quick-select button for {}",
                court.name
            )));
        }
        self.page().court = Some(court.name.clone());
        Ok(())
    }

    async fn date_column_visible(&self, date: NaiveDate) -> Result<bool, SiteError> {
        self.pause().await;
        self.enter(Step::ProbeDate)?;
        let (first, last) = {
            let world = self.site.world();
            self.visible_week(&world)
        };
        Ok(first <= date && date <= last)
    }

    async fn next_week(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::NextWeek)?;
        self.page().week += 1;
        Ok(())
    }

    async fn select_cell(&self, date: NaiveDate, hour: u8) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::SelectCell)?;
        let (first, last) = {
            let world = self.site.world();
            self.visible_week(&world)
        };
        if date < first || date > last || hour > 23 {
            return Err(SiteError::CellNotFound { date, hour });
        }
        self.page().cell = Some((date, hour));
        Ok(())
    }

    async fn submit_application(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::Submit)?;
        let mut page = self.page();
        if page.cell.is_none() {
            return Err(SiteError::UnexpectedPage("no cell selected".into()));
        }
        page.submitted = true;
        Ok(())
    }

    async fn read_confirmation(&self) -> Result<Confirmation, SiteError> {
        self.pause().await;
        let user = self.enter(Step::ReadConfirmation)?;
        let (court, date, hour) = {
            let page = self.page();
            match (&page.court, page.cell, page.submitted) {
                (Some(court), Some((date, hour)), true) => (court.clone(), date, hour),
                _ => return Err(SiteError::UnexpectedPage("nothing submitted".into())),
            }
        };
        let free_entries = self.site.world().account(&user)?.free_entries;
        Ok(Confirmation {
            court,
            date: format!("{}/{}/{}", date.year(), date.month(), date.day()),
            time: format!("{hour}:00"),
            free_entries,
        })
    }

    async fn confirm_entry(&self) -> Result<(), SiteError> {
        self.pause().await;
        let user = self.enter(Step::ConfirmEntry)?;
        let confirmation = {
            let page = self.page();
            match (&page.court, page.cell, page.submitted) {
                (Some(court), Some((date, hour)), true) => {
                    SlotRow::new(court.clone(), date.to_string(), format!("{hour}:00"))
                }
                _ => return Err(SiteError::UnexpectedPage("nothing submitted".into())),
            }
        };
        let mut world = self.site.world();
        let account = world.account(&user)?;
        if account.free_entries == 0 {
            return Err(SiteError::UnexpectedPage("no free entry left".into()));
        }
        account.free_entries -= 1;
        account.entries.push(confirmation);
        self.page().submitted = false;
        Ok(())
    }

    async fn continue_application(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::Submit)?;
        let mut page = self.page();
        page.cell = None;
        page.submitted = false;
        Ok(())
    }

    async fn open_lottery_results(&self) -> Result<(), SiteError> {
        self.pause().await;
        self.enter(Step::OpenResults)?;
        Ok(())
    }

    async fn read_lottery_result(&self) -> Result<Option<SlotRow>, SiteError> {
        self.pause().await;
        let user = self.enter(Step::ReadResult)?;
        let mut world = self.site.world();
        Ok(world.account(&user)?.results.first().cloned())
    }

    async fn confirm_lottery_result(&self) -> Result<(), SiteError> {
        self.pause().await;
        let user = self.enter(Step::ConfirmResult)?;
        let mut world = self.site.world();
        let account = world.account(&user)?;
        if account.results.is_empty() {
            return Err(SiteError::UnexpectedPage("no result to confirm".into()));
        }
        let won = account.results.remove(0);
        account
            .listings
            .entry(StatusKind::Reservation)
            .or_default()
            .push(won);
        Ok(())
    }

    async fn read_listing(&self, kind: StatusKind) -> Result<Vec<SlotRow>, SiteError> {
        self.pause().await;
        let user = self.enter(Step::ReadListing)?;
        let mut world = self.site.world();
        let account = world.account(&user)?;
        let mut rows = account.listings.get(&kind).cloned().unwrap_or_default();
        match kind {
            StatusKind::PendingEntry => rows.extend(account.entries.iter().cloned()),
            StatusKind::UnconfirmedResult => rows.extend(account.results.iter().cloned()),
            StatusKind::Reservation => {}
        }
        Ok(rows)
    }

    async fn close(&self) -> Result<(), SiteError> {
        let already_closed = std::mem::replace(&mut self.page().closed, true);
        if !already_closed {
            let mut world = self.site.world();
            world.closed += 1;
            world.open_now = world.open_now.saturating_sub(1);
        }
        Ok(())
    }
}
