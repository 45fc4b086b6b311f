use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use courtlot_browser::{Browser, Choice, ElementState, LoadState, Locator, Page};
use courtlot_core::{Court, Password, StatusKind};
use tracing::debug;

use crate::cells::{header_day, locate_cell, strip_caption};
use crate::{Confirmation, SessionFactory, SiteConfig, SiteError, SiteSession, SlotRow};

// ── Locator table ──

const LOADING_MASK: &str = "#loadmsg";
const CALENDAR_LOADING: &str = "#usedate-loading";
const DAY_HEADERS: &str = "th[id^=\"usedate-theader-\"]";
const CALENDAR_HEADERS: &str = "#usedate-table thead th";
const CALENDAR_ROW_HEADERS: &str = "#usedate-table tbody tr th";
const CONFIRM_ROW: &str = "#lottery-confirm > table tbody tr:nth-child(1)";
const ENTRY_OPTIONS: &str = "#apply option";
const RESULT_TABLE: &str = "#lottery-result table";
const NO_RESULT: &str = "当選している抽選はありません";
const LOGGED_IN_MARKER: &str = "お知らせ";

/// Menu, entry and table of one status listing page.
struct Listing {
    menu: &'static str,
    entry: &'static str,
    table: &'static str,
}

fn listing(kind: StatusKind) -> Listing {
    match kind {
        StatusKind::PendingEntry => Listing {
            menu: "抽選",
            entry: "抽選申込みの確認",
            table: "#lottery-application table",
        },
        StatusKind::UnconfirmedResult => Listing {
            menu: "抽選",
            entry: "抽選結果",
            table: RESULT_TABLE,
        },
        StatusKind::Reservation => Listing {
            menu: "予約",
            entry: "予約の確認",
            table: "#rsv-list table",
        },
    }
}

fn calendar_cell(row: usize, column: usize) -> Locator {
    Locator::css(format!(
        "#usedate-table tbody tr:nth-child({}) td:nth-child({})",
        row + 1,
        column + 1
    ))
}

// ── Session ──

/// Site session over one browser page.
pub struct BrowserSession {
    page: Box<dyn Page>,
    config: SiteConfig,
}

impl BrowserSession {
    pub fn new(page: Box<dyn Page>, config: SiteConfig) -> Self {
        Self { page, config }
    }

    async fn settle(&self) -> Result<(), SiteError> {
        self.page
            .wait_for(
                &Locator::css(LOADING_MASK),
                ElementState::Hidden,
                self.config.ui_timeout,
            )
            .await?;
        Ok(())
    }

    /// Whichever of DOM-ready and network-idle comes first; DOM-ready is
    /// never later, so that is what is awaited.
    async fn loaded(&self) -> Result<(), SiteError> {
        self.page
            .wait_for_load(LoadState::DomContentLoaded, self.config.load_timeout)
            .await?;
        Ok(())
    }

    async fn idle(&self) -> Result<(), SiteError> {
        self.page
            .wait_for_load(LoadState::NetworkIdle, self.config.load_timeout)
            .await?;
        Ok(())
    }

    async fn open_menu(&self, menu: &str, entry: &Locator) -> Result<(), SiteError> {
        self.settle().await?;
        self.page.click(&Locator::link(menu)).await?;
        self.page.click(entry).await?;
        self.loaded().await
    }

    async fn calendar_settled(&self) -> Result<(), SiteError> {
        self.page
            .wait_for(
                &Locator::css(CALENDAR_LOADING),
                ElementState::Hidden,
                self.config.ui_timeout,
            )
            .await?;
        Ok(())
    }

    async fn first_text(&self, css: &str) -> Result<String, SiteError> {
        let texts = self.page.texts(&Locator::css(css)).await?;
        texts
            .into_iter()
            .next()
            .ok_or_else(|| SiteError::UnexpectedPage(format!("nothing at {css}")))
    }

    /// Cell text minus its `<span>` caption.
    async fn captioned(&self, cell: &str) -> Result<String, SiteError> {
        let text = self.first_text(cell).await?;
        let caption = self
            .page
            .texts(&Locator::css(format!("{cell} span")))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(strip_caption(&text, &caption))
    }

    /// Every row of a listing table as (court, date, time).
    async fn table_rows(&self, table: &str) -> Result<Vec<SlotRow>, SiteError> {
        let column = |css: &str| Locator::css(format!("{table} tbody tr {css}"));
        let courts = self.page.texts(&column("td:nth-child(4) span:nth-child(2)")).await?;
        let dates = self.page.texts(&column("td:nth-child(5) span:nth-child(2)")).await?;
        let times = self.page.texts(&column("td:nth-child(6)")).await?;
        if courts.len() != dates.len() || courts.len() != times.len() {
            return Err(SiteError::UnexpectedPage(format!(
                "{table}: ragged rows ({} courts, {} dates, {} times)",
                courts.len(),
                dates.len(),
                times.len()
            )));
        }
        Ok(courts
            .into_iter()
            .zip(dates)
            .zip(times)
            .map(|((court, date), time)| {
                SlotRow::new(
                    court.trim(),
                    date.replace('\n', ""),
                    time.replace("時刻：", "").replace('\n', "").trim(),
                )
            })
            .collect())
    }
}

#[async_trait]
impl SiteSession for BrowserSession {
    async fn login(&self, member_id: &str, password: &Password) -> Result<bool, SiteError> {
        self.page
            .goto(&self.config.base_url, self.config.load_timeout)
            .await?;
        self.idle().await?;
        self.settle().await?;
        self.page.click(&Locator::button("ログイン")).await?;
        self.page
            .fill(&Locator::textbox("利用者番号"), member_id)
            .await?;
        self.page
            .fill(&Locator::textbox("パスワード"), password.expose())
            .await?;
        self.page.click(&Locator::button("ログイン")).await?;
        self.loaded().await?;
        let marker = self.page.count(&Locator::label(LOGGED_IN_MARKER)).await?;
        Ok(marker > 0)
    }

    async fn logout(&self) -> Result<(), SiteError> {
        self.open_menu("マイメニュー", &Locator::link("ログアウト"))
            .await
    }

    async fn open_lottery_application(&self) -> Result<(), SiteError> {
        self.open_menu("抽選", &Locator::link_exact("抽選申込み"))
            .await?;
        self.idle().await
    }

    async fn has_favorite(&self, court: &Court) -> Result<bool, SiteError> {
        Ok(self.page.is_visible(&Locator::button(&court.name)).await?)
    }

    async fn register_favorite(&self, court: &Court) -> Result<String, SiteError> {
        self.open_menu("抽選", &Locator::link("抽選申込みお気に入り登録"))
            .await?;
        self.idle().await?;
        self.page
            .fill(&Locator::textbox("お気に入り名"), &court.name)
            .await?;
        self.page
            .select(
                &Locator::label("分類必須"),
                &Choice::Label(court.kind.as_str().to_string()),
            )
            .await?;
        self.page
            .select(&Locator::label("公園必須"), &Choice::Label(court.name.clone()))
            .await?;
        let facility = self
            .page
            .select(&Locator::label("施設必須"), &Choice::Index(1))
            .await?;
        debug!(court = %court.name, facility = %facility, "favorite facility chosen");
        self.page.click(&Locator::button("設定")).await?;
        self.loaded().await?;
        Ok(facility)
    }

    async fn select_court(&self, court: &Court) -> Result<(), SiteError> {
        self.page.click(&Locator::button(&court.name)).await?;
        self.calendar_settled().await
    }

    async fn date_column_visible(&self, date: NaiveDate) -> Result<bool, SiteError> {
        self.calendar_settled().await?;
        let headers = self.page.texts(&Locator::css(DAY_HEADERS)).await?;
        Ok(headers
            .iter()
            .any(|h| header_day(h) == Some(date.day())))
    }

    async fn next_week(&self) -> Result<(), SiteError> {
        self.calendar_settled().await?;
        self.idle().await?;
        self.page.click(&Locator::button("翌週")).await?;
        self.calendar_settled().await
    }

    async fn select_cell(&self, date: NaiveDate, hour: u8) -> Result<(), SiteError> {
        let headers = self.page.texts(&Locator::css(CALENDAR_HEADERS)).await?;
        let rows = self.page.texts(&Locator::css(CALENDAR_ROW_HEADERS)).await?;
        let (row, column) = locate_cell(&headers, &rows, date.day(), hour)
            .ok_or(SiteError::CellNotFound { date, hour })?;
        debug!(%date, hour, row, column, "calendar cell located");
        self.page.click(&calendar_cell(row, column)).await?;
        Ok(())
    }

    async fn submit_application(&self) -> Result<(), SiteError> {
        self.page.click(&Locator::button("申込み")).await?;
        self.loaded().await
    }

    async fn read_confirmation(&self) -> Result<Confirmation, SiteError> {
        self.settle().await?;
        let court = self
            .captioned(&format!("{CONFIRM_ROW} td:nth-child(2)"))
            .await?;
        let date = self
            .first_text(&format!("{CONFIRM_ROW} td:nth-child(4) span:nth-child(2)"))
            .await?;
        let time = self
            .captioned(&format!("{CONFIRM_ROW} td:nth-child(5)"))
            .await?;
        let options = self.page.count(&Locator::css(ENTRY_OPTIONS)).await?;
        Ok(Confirmation {
            court,
            date: date.replace('\n', ""),
            time,
            free_entries: u8::try_from(options.saturating_sub(1)).unwrap_or(u8::MAX),
        })
    }

    async fn confirm_entry(&self) -> Result<(), SiteError> {
        self.page
            .select(&Locator::label("申込み番号"), &Choice::Index(1))
            .await?;
        self.page.click(&Locator::button("申込み")).await?;
        self.loaded().await
    }

    async fn continue_application(&self) -> Result<(), SiteError> {
        self.page.click(&Locator::button("続けて申込み")).await?;
        self.calendar_settled().await
    }

    async fn open_lottery_results(&self) -> Result<(), SiteError> {
        self.open_menu("抽選", &Locator::link("抽選結果")).await
    }

    async fn read_lottery_result(&self) -> Result<Option<SlotRow>, SiteError> {
        self.settle().await?;
        if self.page.count(&Locator::text(NO_RESULT)).await? > 0 {
            return Ok(None);
        }
        Ok(self.table_rows(RESULT_TABLE).await?.into_iter().next())
    }

    async fn confirm_lottery_result(&self) -> Result<(), SiteError> {
        self.page
            .click(&Locator::css(format!(
                "{RESULT_TABLE} tbody tr:nth-child(1) button"
            )))
            .await?;
        self.settle().await?;
        self.page.click(&Locator::button("確定")).await?;
        self.loaded().await
    }

    async fn read_listing(&self, kind: StatusKind) -> Result<Vec<SlotRow>, SiteError> {
        let page = listing(kind);
        self.open_menu(page.menu, &Locator::link(page.entry)).await?;
        self.settle().await?;
        self.table_rows(page.table).await
    }

    async fn close(&self) -> Result<(), SiteError> {
        self.page.close().await?;
        Ok(())
    }
}

// ── Factory ──

/// Launches one browser per session.
pub struct BrowserSessionFactory {
    browser: Arc<dyn Browser>,
    config: SiteConfig,
}

impl BrowserSessionFactory {
    pub fn new(browser: Arc<dyn Browser>, config: SiteConfig) -> Self {
        Self { browser, config }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self) -> Result<Box<dyn SiteSession>, SiteError> {
        let page = self.browser.launch().await?;
        Ok(Box::new(BrowserSession::new(page, self.config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use courtlot_browser::BrowserError;
    use courtlot_core::CourtType;

    use super::*;

    /// Page that answers `texts`/`count` from canned tables and records
    /// every action.
    #[derive(Default)]
    struct CannedPage {
        texts: HashMap<String, Vec<String>>,
        counts: HashMap<String, usize>,
        actions: Arc<Mutex<Vec<String>>>,
    }

    impl CannedPage {
        fn text(mut self, locator: Locator, values: &[&str]) -> Self {
            self.texts.insert(
                locator.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
            self
        }

        fn count(mut self, locator: Locator, n: usize) -> Self {
            self.counts.insert(locator.to_string(), n);
            self
        }

        fn record(&self, action: String) {
            self.actions.lock().unwrap().push(action);
        }
    }

    #[async_trait]
    impl Page for CannedPage {
        async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
            self.record(format!("goto {url}"));
            Ok(())
        }

        async fn wait_for_load(
            &self,
            _state: LoadState,
            _timeout: Duration,
        ) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn wait_for(
            &self,
            _locator: &Locator,
            _state: ElementState,
            _timeout: Duration,
        ) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
            self.record(format!("click {locator}"));
            Ok(())
        }

        async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
            self.record(format!("fill {locator} {value}"));
            Ok(())
        }

        async fn select(&self, locator: &Locator, choice: &Choice) -> Result<String, BrowserError> {
            self.record(format!("select {locator} {choice:?}"));
            Ok("庭球場A".into())
        }

        async fn count(&self, locator: &Locator) -> Result<usize, BrowserError> {
            Ok(self.counts.get(&locator.to_string()).copied().unwrap_or(0))
        }

        async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
            Ok(self.counts.get(&locator.to_string()).copied().unwrap_or(0) > 0)
        }

        async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
            Ok(self.texts.get(&locator.to_string()).cloned().unwrap_or_default())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            self.record("close".into());
            Ok(())
        }
    }

    fn session(page: CannedPage) -> (BrowserSession, Arc<Mutex<Vec<String>>>) {
        let actions = page.actions.clone();
        (BrowserSession::new(Box::new(page), SiteConfig::default()), actions)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, d).unwrap()
    }

    #[tokio::test]
    async fn login_without_news_panel_is_rejected() {
        let (s, actions) = session(CannedPage::default());
        let ok = s.login("10001", &Password::new("secret")).await.unwrap();
        assert!(!ok);
        let actions = actions.lock().unwrap();
        assert_eq!(actions[0], format!("goto {}", crate::DEFAULT_BASE_URL));
        assert!(actions.iter().any(|a| a.contains("利用者番号") && a.ends_with("10001")));
    }

    #[tokio::test]
    async fn login_with_news_panel_succeeds() {
        let page = CannedPage::default().count(Locator::label(LOGGED_IN_MARKER), 1);
        let (s, _) = session(page);
        assert!(s.login("10001", &Password::new("secret")).await.unwrap());
    }

    #[tokio::test]
    async fn select_cell_clicks_located_cell() {
        let page = CannedPage::default()
            .text(
                Locator::css(CALENDAR_HEADERS),
                &["", "2日(月)", "3日(火)", "13日(金)"],
            )
            .text(Locator::css(CALENDAR_ROW_HEADERS), &["７", "９", "１１"]);
        let (s, actions) = session(page);
        s.select_cell(date(3), 9).await.unwrap();
        let last = actions.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last, format!("click {}", calendar_cell(1, 2)));
    }

    #[tokio::test]
    async fn select_cell_reports_missing_cell() {
        let page = CannedPage::default()
            .text(Locator::css(CALENDAR_HEADERS), &["", "2日(月)"])
            .text(Locator::css(CALENDAR_ROW_HEADERS), &["９"]);
        let (s, _) = session(page);
        let err = s.select_cell(date(20), 9).await.unwrap_err();
        assert!(matches!(err, SiteError::CellNotFound { hour: 9, .. }));
    }

    #[tokio::test]
    async fn date_column_matches_whole_day_numbers() {
        let page = CannedPage::default().text(Locator::css(DAY_HEADERS), &["13日(金)", "14日(土)"]);
        let (s, _) = session(page);
        assert!(!s.date_column_visible(date(3)).await.unwrap());
        assert!(s.date_column_visible(date(13)).await.unwrap());
    }

    #[tokio::test]
    async fn confirmation_strips_captions_and_counts_free_entries() {
        let court_cell = format!("{CONFIRM_ROW} td:nth-child(2)");
        let time_cell = format!("{CONFIRM_ROW} td:nth-child(5)");
        let page = CannedPage::default()
            .text(Locator::css(court_cell.clone()), &["施設\n日比谷公園"])
            .text(Locator::css(format!("{court_cell} span")), &["施設"])
            .text(
                Locator::css(format!("{CONFIRM_ROW} td:nth-child(4) span:nth-child(2)")),
                &["2026/11/3\n(火)"],
            )
            .text(Locator::css(time_cell.clone()), &["時間 9:00～11:00"])
            .text(Locator::css(format!("{time_cell} span")), &["時間"])
            .count(Locator::css(ENTRY_OPTIONS), 3);
        let (s, _) = session(page);
        let c = s.read_confirmation().await.unwrap();
        assert_eq!(c.court, "日比谷公園");
        assert_eq!(c.date, "2026/11/3(火)");
        assert_eq!(c.time, "9:00～11:00");
        assert_eq!(c.free_entries, 2);
    }

    #[tokio::test]
    async fn no_result_sentinel_means_nothing_won() {
        let page = CannedPage::default().count(Locator::text(NO_RESULT), 1);
        let (s, _) = session(page);
        assert_eq!(s.read_lottery_result().await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_rows_are_zipped_and_cleaned() {
        let table = listing(StatusKind::PendingEntry).table;
        let col = |css: &str| Locator::css(format!("{table} tbody tr {css}"));
        let page = CannedPage::default()
            .text(col("td:nth-child(4) span:nth-child(2)"), &["日比谷公園", "芝公園"])
            .text(col("td:nth-child(5) span:nth-child(2)"), &["2026/11/3\n", "2026/11/4"])
            .text(col("td:nth-child(6)"), &["時刻：9:00", "時刻：\n11:00"]);
        let (s, actions) = session(page);
        let rows = s.read_listing(StatusKind::PendingEntry).await.unwrap();
        assert_eq!(
            rows,
            vec![
                SlotRow::new("日比谷公園", "2026/11/3", "9:00"),
                SlotRow::new("芝公園", "2026/11/4", "11:00"),
            ]
        );
        assert!(actions.lock().unwrap().iter().any(|a| a.contains("抽選申込みの確認")));
    }

    #[tokio::test]
    async fn ragged_listing_is_an_error() {
        let table = listing(StatusKind::Reservation).table;
        let page = CannedPage::default().text(
            Locator::css(format!("{table} tbody tr td:nth-child(4) span:nth-child(2)")),
            &["日比谷公園"],
        );
        let (s, _) = session(page);
        let err = s.read_listing(StatusKind::Reservation).await.unwrap_err();
        assert!(matches!(err, SiteError::UnexpectedPage(_)));
    }

    #[tokio::test]
    async fn favorite_registration_fills_form() {
        let (s, actions) = session(CannedPage::default());
        let court = Court {
            name: "日比谷公園".into(),
            kind: CourtType::Hard,
        };
        let facility = s.register_favorite(&court).await.unwrap();
        assert_eq!(facility, "庭球場A");
        let actions = actions.lock().unwrap();
        assert!(actions.iter().any(|a| a.contains("分類必須") && a.contains("テニス（ハード）")));
        assert_eq!(actions.last().unwrap(), &format!("click {}", Locator::button("設定")));
    }
}
