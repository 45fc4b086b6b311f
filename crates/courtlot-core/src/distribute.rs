//! Pairing roster members with lottery targets.
//!
//! Members are dealt round-robin over the configured targets in roster order:
//! member `i` (0-based) goes to target `i % targets.len()` and receives lottery
//! number `i + 1`. The lottery number is the stable key of the resulting work
//! item for the rest of the batch.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::court::{Court, CourtType};
use crate::member::Member;
use crate::outcome::DispatchItem;
use crate::setting::LotterySetting;
use crate::ConfigError;

/// Court as written in a lottery setting, before the type is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One configured target, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    pub court: CourtSpec,
    pub date: NaiveDate,
    pub start_hour: u8,
}

impl TargetSpec {
    /// Same label as the validated target, available before validation.
    pub fn label(&self) -> String {
        slot_label(self.date, &self.court.name, self.start_hour)
    }

    /// Check the court type against the allow-list and the hour range.
    pub fn validate(&self) -> Result<LotteryTarget, ConfigError> {
        let kind: CourtType = self.court.kind.parse()?;
        if self.start_hour > 23 {
            return Err(ConfigError::InvalidStartHour(self.start_hour));
        }
        Ok(LotteryTarget {
            court: Court {
                name: self.court.name.clone(),
                kind,
            },
            date: self.date,
            start_hour: self.start_hour,
        })
    }
}

/// A validated reservation slot description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryTarget {
    pub court: Court,
    pub date: NaiveDate,
    pub start_hour: u8,
}

impl LotteryTarget {
    /// File-name friendly label: `<month>-<day><court>_<hour>`, whitespace in the
    /// court name replaced by `_`.
    pub fn label(&self) -> String {
        slot_label(self.date, &self.court.name, self.start_hour)
    }
}

fn slot_label(date: NaiveDate, court: &str, hour: u8) -> String {
    let court = court.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}-{}{}_{}", date.month(), date.day(), court, hour)
}

/// One row of a distribution: who applies for what, under which lottery number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub lottery_no: u32,
    pub member: Member,
    pub target: TargetSpec,
    pub month: u32,
}

impl Assignment {
    /// Turn the row into a dispatchable work item, rejecting invalid targets.
    pub fn work_item(&self) -> Result<WorkItem, ConfigError> {
        Ok(WorkItem {
            sequence_no: self.lottery_no,
            member: self.member.clone(),
            target: self.target.validate()?,
        })
    }
}

/// The unit of dispatch for the application protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub sequence_no: u32,
    pub member: Member,
    pub target: LotteryTarget,
}

impl DispatchItem for WorkItem {
    fn sequence_no(&self) -> u32 {
        self.sequence_no
    }

    fn member(&self) -> &Member {
        &self.member
    }
}

/// Deal `members` round-robin over the setting's targets.
///
/// Returns assignments in lottery-number order. An empty target list yields
/// no assignments.
pub fn distribute(members: &[Member], setting: &LotterySetting) -> Vec<Assignment> {
    let targets = &setting.targets;
    if targets.is_empty() {
        return Vec::new();
    }
    members
        .iter()
        .enumerate()
        .map(|(i, member)| Assignment {
            lottery_no: i as u32 + 1,
            member: member.clone(),
            target: targets[i % targets.len()].clone(),
            month: setting.month,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, kind: &str, day: u32, hour: u8) -> TargetSpec {
        TargetSpec {
            court: CourtSpec {
                name: name.into(),
                kind: kind.into(),
            },
            date: NaiveDate::from_ymd_opt(2026, 11, day).unwrap(),
            start_hour: hour,
        }
    }

    fn members(n: usize) -> Vec<Member> {
        (1..=n)
            .map(|i| Member::new(format!("{i:05}"), format!("member{i}"), "pw"))
            .collect()
    }

    #[test]
    fn round_robin_over_two_targets() {
        let setting = LotterySetting {
            month: 11,
            targets: vec![
                spec("日比谷公園", "テニス（ハード）", 3, 9),
                spec("有明テニスの森", "テニス（人工芝）", 4, 11),
            ],
        };
        let rows = distribute(&members(4), &setting);

        assert_eq!(rows.len(), 4);
        let first: Vec<u32> = rows
            .iter()
            .filter(|a| a.target == setting.targets[0])
            .map(|a| a.lottery_no)
            .collect();
        let second: Vec<u32> = rows
            .iter()
            .filter(|a| a.target == setting.targets[1])
            .map(|a| a.lottery_no)
            .collect();
        assert_eq!(first, vec![1, 3]);
        assert_eq!(second, vec![2, 4]);
        assert!(rows.iter().all(|a| a.month == 11));
    }

    #[test]
    fn no_targets_no_assignments() {
        let setting = LotterySetting {
            month: 11,
            targets: vec![],
        };
        assert!(distribute(&members(3), &setting).is_empty());
    }

    #[test]
    fn invalid_court_type_fails_work_item() {
        let setting = LotterySetting {
            month: 11,
            targets: vec![spec("日比谷公園", "バスケット", 3, 9)],
        };
        let rows = distribute(&members(1), &setting);
        assert!(matches!(
            rows[0].work_item(),
            Err(ConfigError::InvalidCourtType(_))
        ));
    }

    #[test]
    fn hour_out_of_range_is_rejected() {
        let err = spec("日比谷公園", "テニス（ハード）", 3, 24)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidStartHour(24));
    }

    #[test]
    fn label_replaces_whitespace() {
        let target = spec("Shiba  Park East", "テニス（ハード）", 7, 13)
            .validate()
            .unwrap();
        assert_eq!(target.label(), "11-7Shiba_Park_East_13");
    }

    #[test]
    fn target_spec_json_shape() {
        let json = r#"{"court":{"name":"日比谷公園","type":"テニス（ハード）"},"date":"2026-11-03","startHour":9}"#;
        let parsed: TargetSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, spec("日比谷公園", "テニス（ハード）", 3, 9));
    }
}
