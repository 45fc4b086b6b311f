//! Lottery application: one member, one target.

use async_trait::async_trait;
use chrono::NaiveDate;
use courtlot_core::{LotteryTarget, ProtocolLog, WorkItem};
use courtlot_site::SiteSession;

use crate::{Attempt, Protocol, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// How many times "next week" may be pressed looking for the target date.
    pub max_week_pages: u32,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { max_week_pages: 10 }
    }
}

/// Login, open the lottery form, make sure the court is a favorite, pick the
/// cell, then use as many of the member's free entries as the site offers
/// (at most two). Succeeds with the number of entries applied.
#[derive(Debug, Clone, Default)]
pub struct ApplyProtocol {
    options: ApplyOptions,
    positions: Option<Vec<(LotteryTarget, usize)>>,
}

impl ApplyProtocol {
    pub fn new(options: ApplyOptions) -> Self {
        Self {
            options,
            positions: None,
        }
    }

    /// Name lane logs after each target's position in the setting rather than
    /// the lane index, so they line up with the logs of skipped targets.
    pub fn with_target_positions(mut self, positions: Vec<(LotteryTarget, usize)>) -> Self {
        self.positions = Some(positions);
        self
    }

    /// Prefix for a lane working on `target` alone. `None` when the target is
    /// not listed exactly once.
    fn number_of(&self, lane: usize, target: &LotteryTarget) -> Option<usize> {
        let Some(positions) = &self.positions else {
            return Some(lane);
        };
        let mut hits = positions.iter().filter(|(t, _)| t == target).map(|(_, n)| *n);
        match (hits.next(), hits.next()) {
            (Some(n), None) => Some(n),
            _ => None,
        }
    }

    /// Press "next week" until `date` has a column.
    async fn seek_week(
        &self,
        session: &dyn SiteSession,
        date: NaiveDate,
        log: &dyn ProtocolLog,
    ) -> Result<(), ProtocolError> {
        let mut pages = 0;
        while !session.date_column_visible(date).await? {
            if pages == self.options.max_week_pages {
                return Err(ProtocolError::PaginationExhausted { date, pages });
            }
            session.next_week().await?;
            pages += 1;
            log.info(&format!("next week ({pages})"));
        }
        Ok(())
    }

    /// Select the target cell and submit; returns the free entries shown.
    async fn submit_cell(
        &self,
        session: &dyn SiteSession,
        item: &WorkItem,
        log: &dyn ProtocolLog,
    ) -> Result<u8, ProtocolError> {
        let target = &item.target;
        self.seek_week(session, target.date, log).await?;
        session.select_cell(target.date, target.start_hour).await?;
        log.info(&format!("cell selected: {} {}:00", target.date, target.start_hour));
        session.submit_application().await?;
        let confirmation = session.read_confirmation().await?;
        log.info(&format!(
            "confirmation: {} {} {} (free entries: {})",
            confirmation.court, confirmation.date, confirmation.time, confirmation.free_entries
        ));
        Ok(confirmation.free_entries)
    }

    async fn confirm(
        &self,
        session: &dyn SiteSession,
        item: &WorkItem,
        log: &dyn ProtocolLog,
    ) -> Result<(), ProtocolError> {
        session.confirm_entry().await?;
        log.info(&format!(
            "lottery entry applied: {} ({})",
            item.member.name, item.member.id
        ));
        Ok(())
    }
}

#[async_trait]
impl Protocol for ApplyProtocol {
    type Item = WorkItem;
    type Output = u8;

    fn lane_name(&self, lane: usize, items: &[WorkItem]) -> String {
        match items.split_first() {
            Some((first, rest)) if rest.iter().all(|i| i.target == first.target) => {
                match self.number_of(lane, &first.target) {
                    Some(n) => format!("{n}_{}", first.target.label()),
                    None => format!("lottery_{lane}"),
                }
            }
            _ => format!("lottery_{lane}"),
        }
    }

    fn retry_name(&self) -> String {
        "lottery_redo".to_string()
    }

    fn describe(&self, item: &WorkItem) -> String {
        format!(
            "{} ({}) {}",
            item.member.name,
            item.member.id,
            item.target.label()
        )
    }

    async fn run(
        &self,
        session: &dyn SiteSession,
        item: &WorkItem,
        log: &dyn ProtocolLog,
    ) -> Result<Attempt<u8>, ProtocolError> {
        let member = &item.member;
        let court = &item.target.court;
        log.info(&format!(
            "lottery no {}: {} ({}) -> {} {} {}:00",
            item.sequence_no,
            member.name,
            member.id,
            court.name,
            item.target.date,
            item.target.start_hour
        ));

        if !session.login(&member.id, &member.password).await? {
            return Ok(Attempt::LoginRejected);
        }
        log.info("logged in");

        session.open_lottery_application().await?;
        log.info("lottery application page opened");

        if !session.has_favorite(court).await? {
            let facility = session.register_favorite(court).await?;
            log.info(&format!("favorite registered: {} / {facility}", court.name));
            session.open_lottery_application().await?;
        }

        session.select_court(court).await?;
        log.info(&format!("court selected: {}", court.name));

        let applied = match self.submit_cell(session, item, log).await? {
            0 => {
                log.warn("no free lottery entry left");
                0
            }
            1 => {
                self.confirm(session, item, log).await?;
                1
            }
            _ => {
                self.confirm(session, item, log).await?;
                session.continue_application().await?;
                if self.submit_cell(session, item, log).await? > 0 {
                    self.confirm(session, item, log).await?;
                    2
                } else {
                    log.warn("second entry no longer free");
                    1
                }
            }
        };

        session.logout().await?;
        log.info("logged out");
        Ok(Attempt::Completed(applied))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courtlot_core::{CourtSpec, LotterySetting, Member, Outcome, TargetSpec, distribute};
    use courtlot_site::sim::{SimSite, Step};

    use super::*;
    use crate::Dispatcher;
    use crate::testing::MemoryLogs;

    const HIBIYA: &str = "日比谷公園";
    const SHIBA: &str = "芝公園";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, d).unwrap()
    }

    fn target(name: &str, date: NaiveDate, hour: u8) -> TargetSpec {
        TargetSpec {
            court: CourtSpec {
                name: name.into(),
                kind: "テニス（人工芝）".into(),
            },
            date,
            start_hour: hour,
        }
    }

    fn members(n: usize) -> Vec<Member> {
        (1..=n)
            .map(|i| Member::new(format!("1000{i}"), format!("member{i}"), "pw"))
            .collect()
    }

    fn items(members: &[Member], targets: Vec<TargetSpec>) -> Vec<WorkItem> {
        let setting = LotterySetting { month: 11, targets };
        distribute(members, &setting)
            .iter()
            .map(|a| a.work_item().unwrap())
            .collect()
    }

    fn site_for(members: &[Member]) -> SimSite {
        let site = SimSite::new(day(2));
        for m in members {
            site.add_account(&m.id, "pw");
        }
        site
    }

    async fn apply(
        site: &SimSite,
        logs: &MemoryLogs,
        concurrency: usize,
        items: Vec<WorkItem>,
    ) -> Vec<crate::Report<WorkItem, u8>> {
        Dispatcher::new(Arc::new(site.clone()), Arc::new(logs.clone()))
            .with_concurrency(concurrency)
            .run(Arc::new(ApplyProtocol::default()), items)
            .await
    }

    #[tokio::test]
    async fn two_targets_two_lanes() {
        let members = members(4);
        let site = site_for(&members);
        let logs = MemoryLogs::default();
        let t1 = target(HIBIYA, day(3), 9);
        let t2 = target(SHIBA, day(4), 11);
        let reports = apply(&site, &logs, 2, items(&members, vec![t1.clone(), t2.clone()])).await;

        assert_eq!(reports.len(), 4);
        let on = |i: usize| reports[i].item.target.court.name.as_str();
        assert_eq!((on(0), on(2)), (HIBIYA, HIBIYA));
        assert_eq!((on(1), on(3)), (SHIBA, SHIBA));
        assert!(reports.iter().all(|r| r.outcome == Outcome::Success(2)));
        assert_eq!(site.entries("10001").len(), 2);

        let lane1 = format!("0_{}", t1.validate().unwrap().label());
        assert!(logs.contains(&lane1, "member1"));
        assert!(logs.contains(&lane1, "member3"));
        assert!(!logs.contains(&lane1, "member2"));
    }

    #[tokio::test]
    async fn favorite_is_registered_only_when_missing() {
        let members = members(2);
        let site = site_for(&members);
        site.add_favorite("10001", HIBIYA);
        let logs = MemoryLogs::default();
        apply(&site, &logs, 1, items(&members, vec![target(HIBIYA, day(3), 9)])).await;
        assert_eq!(site.favorite_registrations("10001"), 0);
        assert_eq!(site.favorite_registrations("10002"), 1);
    }

    #[tokio::test]
    async fn free_entries_decide_slots_applied() {
        let members = members(3);
        let site = site_for(&members);
        site.set_free_entries("10001", 0);
        site.set_free_entries("10002", 1);
        let logs = MemoryLogs::default();
        let reports = apply(&site, &logs, 1, items(&members, vec![target(HIBIYA, day(3), 9)])).await;
        let applied: Vec<_> = reports.iter().map(|r| r.outcome.clone()).collect();
        assert_eq!(
            applied,
            vec![Outcome::Success(0), Outcome::Success(1), Outcome::Success(2)]
        );
        assert!(site.entries("10001").is_empty());
        assert_eq!(site.entries("10002").len(), 1);
    }

    #[tokio::test]
    async fn far_dates_exhaust_pagination() {
        let members = members(1);
        let site = site_for(&members);
        let logs = MemoryLogs::default();
        let far = day(2) + chrono::Days::new(7 * 20);
        let reports = apply(&site, &logs, 1, items(&members, vec![target(HIBIYA, far, 9)])).await;
        assert!(matches!(&reports[0].outcome, Outcome::Error(d) if d.contains("week pages")));
        assert!(reports[0].retried);
    }

    #[tokio::test]
    async fn later_week_is_reached_by_paging() {
        let members = members(1);
        let site = site_for(&members);
        let logs = MemoryLogs::default();
        let reports = apply(&site, &logs, 1, items(&members, vec![target(HIBIYA, day(20), 9)])).await;
        assert_eq!(reports[0].outcome, Outcome::Success(2));
        let lane = format!("0_{}", reports[0].item.target.label());
        assert!(logs.contains(&lane, "next week (2)"));
    }

    #[tokio::test]
    async fn mid_flow_error_resolves_on_retry() {
        let members = members(2);
        let site = site_for(&members);
        site.fail("10002", Step::SelectCell, 1);
        let logs = MemoryLogs::default();
        let reports = apply(&site, &logs, 1, items(&members, vec![target(HIBIYA, day(3), 9)])).await;
        assert_eq!(reports[1].outcome, Outcome::Success(2));
        assert!(reports[1].retried);
        assert!(logs.contains("lottery_redo", "resolved on retry: no 2"));
    }

    #[test]
    fn mixed_lane_falls_back_to_index_name() {
        let members = members(2);
        let items = items(
            &members,
            vec![target(HIBIYA, day(3), 9), target(SHIBA, day(3), 9)],
        );
        let protocol = ApplyProtocol::default();
        assert_eq!(protocol.lane_name(4, &items), "lottery_4");
        assert_eq!(
            protocol.lane_name(0, &items[..1]),
            format!("0_{}", items[0].target.label())
        );
    }

    #[test]
    fn lane_is_named_after_the_target_position() {
        let members = members(3);
        let items = items(
            &members,
            vec![target(HIBIYA, day(3), 9), target(SHIBA, day(3), 9), target(SHIBA, day(3), 9)],
        );
        let hibiya = items[0].target.clone();
        let shiba = items[1].target.clone();
        // Position 1 of the setting was skipped as invalid.
        let protocol = ApplyProtocol::default().with_target_positions(vec![(hibiya, 0), (shiba, 2)]);
        assert_eq!(
            protocol.lane_name(0, &items[..1]),
            format!("0_{}", items[0].target.label())
        );
        assert_eq!(
            protocol.lane_name(1, &items[1..]),
            format!("2_{}", items[1].target.label())
        );
    }

    #[test]
    fn unlisted_or_repeated_target_falls_back_to_lane_name() {
        let members = members(2);
        let items = items(
            &members,
            vec![target(HIBIYA, day(3), 9), target(SHIBA, day(3), 9)],
        );
        let hibiya = items[0].target.clone();
        let protocol =
            ApplyProtocol::default().with_target_positions(vec![(hibiya.clone(), 0), (hibiya, 3)]);
        assert_eq!(protocol.lane_name(0, &items[..1]), "lottery_0");
        assert_eq!(protocol.lane_name(1, &items[1..]), "lottery_1");
    }
}
