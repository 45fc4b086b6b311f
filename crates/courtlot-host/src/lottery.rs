//! Batch operations over a stored profile.
//!
//! [`Lottery`] ties the data directory to a session factory and a lane log
//! factory. Each operation loads what it needs from disk, hands work items to
//! a [`Dispatcher`], and writes any CSV output back to the data directory.

use std::sync::Arc;

use anyhow::Context;
use courtlot_core::{
    Assignment, ConfigError, LaneLogs, LotterySetting, Member, RosterEntry, StatusRecord,
    VALID_COURT_TYPES, WorkItem, distribute, roster,
};
use courtlot_dispatch::{
    ApplyOptions, ApplyProtocol, ConfirmResultProtocol, Dispatcher, ProgressFn, Report,
    StatusProtocol, StatusReport, Tally,
};
use courtlot_site::SessionFactory;
use courtlot_store::{DataDir, read_lottery_info, write_lottery_info, write_status_csv};
use tracing::{info, warn};

use crate::SettingError;

/// Lanes used for whole-roster operations when none is configured.
pub const DEFAULT_ROSTER_CONCURRENCY: usize = 10;

/// Result of a lottery application run.
#[derive(Debug, Clone, Default)]
pub struct ApplyRun {
    pub reports: Vec<Report<WorkItem, u8>>,
    /// Assignments never dispatched because their target is invalid.
    pub skipped: Vec<(Assignment, ConfigError)>,
}

impl ApplyRun {
    pub fn tally(&self) -> Tally {
        Tally::of(&self.reports)
    }

    /// Every assignment was dispatched and applied.
    pub fn succeeded(&self) -> bool {
        self.skipped.is_empty() && self.tally().all_succeeded()
    }
}

pub struct Lottery {
    data: DataDir,
    sessions: Arc<dyn SessionFactory>,
    logs: Arc<dyn LaneLogs>,
    apply_options: ApplyOptions,
    concurrency: Option<usize>,
}

impl Lottery {
    pub fn new(data: DataDir, sessions: Arc<dyn SessionFactory>, logs: Arc<dyn LaneLogs>) -> Self {
        Self {
            data,
            sessions,
            logs,
            apply_options: ApplyOptions::default(),
            concurrency: None,
        }
    }

    /// Fixed lane count for lottery and roster runs. Without it, a lottery
    /// run uses one lane per valid target and roster operations use
    /// [`DEFAULT_ROSTER_CONCURRENCY`]. Range re-runs always use one lane.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_apply_options(mut self, options: ApplyOptions) -> Self {
        self.apply_options = options;
        self
    }

    pub fn data(&self) -> &DataDir {
        &self.data
    }

    /// The profile's saved setting, or an error if it has none.
    pub fn load_setting(&self, profile_id: &str) -> anyhow::Result<LotterySetting> {
        self.data
            .load_lottery_setting(profile_id)
            .with_context(|| format!("loading lottery setting for {profile_id}"))?
            .ok_or_else(|| SettingError::MissingSetting(profile_id.to_string()).into())
    }

    fn dispatcher(&self, lanes: usize, progress: Option<ProgressFn>) -> Dispatcher {
        let dispatcher =
            Dispatcher::new(self.sessions.clone(), self.logs.clone()).with_concurrency(lanes);
        match progress {
            Some(progress) => dispatcher.with_progress(progress),
            None => dispatcher,
        }
    }

    // ── Lottery application ──

    /// Distribute `members` over the setting and write the lottery-info CSV.
    pub fn distribute_only(
        &self,
        members: &[Member],
        setting: &LotterySetting,
    ) -> anyhow::Result<Vec<Assignment>> {
        setting.check().map_err(SettingError::from)?;
        let assignments = distribute(members, setting);
        let path = self.data.lottery_info_path();
        write_lottery_info(&path, &assignments)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(assignments)
    }

    /// Apply for every member of the profile, one lane per valid target.
    ///
    /// A target whose court type is not on the allow-list gets its error and
    /// the allowed types written to its own lane log; its members are skipped
    /// without opening a session.
    pub async fn execute_lottery(
        &self,
        profile_id: &str,
        setting: &LotterySetting,
        progress: Option<ProgressFn>,
    ) -> anyhow::Result<ApplyRun> {
        let members = self
            .data
            .load_members(profile_id)
            .with_context(|| format!("loading members of {profile_id}"))?;
        if members.is_empty() {
            warn!(profile = profile_id, "no members to apply for");
        }
        let assignments = self.distribute_only(&members, setting)?;

        // Lane logs and the logs of skipped targets share one numbering: the
        // target's position in the setting.
        let mut positions = Vec::new();
        for (index, target) in setting.targets.iter().enumerate() {
            match target.validate() {
                Ok(valid) => positions.push((valid, index)),
                Err(e) => {
                    let log = self.logs.open(&format!("{index}_{}", target.label()));
                    log.info(&format!(
                        "target: {} ({}) {} {}:00",
                        target.court.name, target.court.kind, target.date, target.start_hour
                    ));
                    log.error(&e.to_string());
                    log.error("allowed court types:");
                    for kind in VALID_COURT_TYPES {
                        log.error(&format!("- {kind}"));
                    }
                }
            }
        }

        let (items, skipped) = split_valid(assignments);
        info!(
            profile = profile_id,
            month = setting.month,
            items = items.len(),
            skipped = skipped.len(),
            "lottery run"
        );
        if items.is_empty() {
            return Ok(ApplyRun {
                reports: Vec::new(),
                skipped,
            });
        }

        let lanes = self.concurrency.unwrap_or(positions.len());
        let protocol =
            Arc::new(ApplyProtocol::new(self.apply_options).with_target_positions(positions));
        let reports = self
            .dispatcher(lanes, progress)
            .run(protocol, items)
            .await;
        Ok(ApplyRun { reports, skipped })
    }

    /// Re-run lottery numbers `start..=end` from the last written lottery
    /// info, one item after another on a single lane.
    pub async fn apply_range(
        &self,
        start: u32,
        end: u32,
        progress: Option<ProgressFn>,
    ) -> anyhow::Result<ApplyRun> {
        if start == 0 || start > end {
            return Err(SettingError::InvalidRange { start, end }.into());
        }
        let path = self.data.lottery_info_path();
        let assignments: Vec<Assignment> = read_lottery_info(&path)
            .with_context(|| format!("reading {}", path.display()))?
            .into_iter()
            .filter(|a| (start..=end).contains(&a.lottery_no))
            .collect();

        let (items, skipped) = split_valid(assignments);
        for (assignment, e) in &skipped {
            warn!(lottery_no = assignment.lottery_no, error = %e, "skipping assignment");
        }
        info!(start, end, items = items.len(), "range run");
        let protocol = Arc::new(ApplyProtocol::new(self.apply_options));
        let reports = self.dispatcher(1, progress).run(protocol, items).await;
        Ok(ApplyRun { reports, skipped })
    }

    // ── Roster operations ──

    fn roster_lanes(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_ROSTER_CONCURRENCY)
    }

    fn roster_of(&self, profile_id: &str) -> anyhow::Result<Vec<RosterEntry>> {
        let members = self
            .data
            .load_members(profile_id)
            .with_context(|| format!("loading members of {profile_id}"))?;
        Ok(roster(&members))
    }

    /// Confirm won lottery results for every member of the profile.
    pub async fn confirm_results(
        &self,
        profile_id: &str,
        progress: Option<ProgressFn>,
    ) -> anyhow::Result<Vec<Report<RosterEntry, Option<StatusRecord>>>> {
        let entries = self.roster_of(profile_id)?;
        info!(profile = profile_id, members = entries.len(), "confirming results");
        Ok(self
            .dispatcher(self.roster_lanes(), progress)
            .run(Arc::new(ConfirmResultProtocol), entries)
            .await)
    }

    /// Read every member's entries, results and reservations, and write them
    /// to the status CSV.
    pub async fn application_status(
        &self,
        profile_id: &str,
        progress: Option<ProgressFn>,
    ) -> anyhow::Result<StatusReport> {
        let entries = self.roster_of(profile_id)?;
        info!(profile = profile_id, members = entries.len(), "reading status");
        let reports = self
            .dispatcher(self.roster_lanes(), progress)
            .run(Arc::new(StatusProtocol), entries)
            .await;
        let report = StatusReport::from_reports(&reports);

        let path = self.data.status_path();
        write_status_csv(&path, &report.records, &report.login_failed, &report.errors)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(report)
    }
}

/// Work items for assignments with a valid target, and the rest with why.
fn split_valid(assignments: Vec<Assignment>) -> (Vec<WorkItem>, Vec<(Assignment, ConfigError)>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();
    for assignment in assignments {
        match assignment.work_item() {
            Ok(item) => items.push(item),
            Err(e) => skipped.push((assignment, e)),
        }
    }
    (items, skipped)
}
