//! The distribution written out as `lotteryInfo.csv`, one row per
//! assignment, sorted by lottery number.

use std::fs::{self, File};
use std::path::Path;

use chrono::NaiveDate;
use courtlot_core::{Assignment, CourtSpec, Member, TargetSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StoreError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoRow {
    lottery_no: u32,
    member_name: String,
    member_id: String,
    password: String,
    court_type: String,
    court_name: String,
    month: u32,
    date: NaiveDate,
    start_hour: u8,
}

impl From<&Assignment> for InfoRow {
    fn from(a: &Assignment) -> Self {
        Self {
            lottery_no: a.lottery_no,
            member_name: a.member.name.clone(),
            member_id: a.member.id.clone(),
            password: a.member.password.expose().to_string(),
            court_type: a.target.court.kind.clone(),
            court_name: a.target.court.name.clone(),
            month: a.month,
            date: a.target.date,
            start_hour: a.target.start_hour,
        }
    }
}

impl From<InfoRow> for Assignment {
    fn from(row: InfoRow) -> Self {
        Self {
            lottery_no: row.lottery_no,
            member: Member::new(row.member_id, row.member_name, row.password),
            target: TargetSpec {
                court: CourtSpec {
                    name: row.court_name,
                    kind: row.court_type,
                },
                date: row.date,
                start_hour: row.start_hour,
            },
            month: row.month,
        }
    }
}

/// Replace the file at `path` with `assignments`, sorted by lottery number.
pub fn write_lottery_info(path: &Path, assignments: &[Assignment]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    let mut rows: Vec<InfoRow> = assignments.iter().map(InfoRow::from).collect();
    rows.sort_by_key(|r| r.lottery_no);

    let file = File::create(path).map_err(StoreError::io(path))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in &rows {
        writer.serialize(row).map_err(StoreError::csv(path))?;
    }
    writer.flush().map_err(StoreError::io(path))?;
    info!(path = %path.display(), rows = rows.len(), "lottery info written");
    Ok(())
}

pub fn read_lottery_info(path: &Path) -> Result<Vec<Assignment>, StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(StoreError::csv(path))?;
    reader
        .deserialize::<InfoRow>()
        .map(|row| row.map(Assignment::from).map_err(StoreError::csv(path)))
        .collect()
}

#[cfg(test)]
mod tests {
    use courtlot_core::{LotterySetting, distribute};

    use super::*;

    fn setting() -> LotterySetting {
        let target = |name: &str, kind: &str, d: u32, hour: u8| TargetSpec {
            court: CourtSpec {
                name: name.into(),
                kind: kind.into(),
            },
            date: NaiveDate::from_ymd_opt(2026, 11, d).unwrap(),
            start_hour: hour,
        };
        LotterySetting {
            month: 11,
            targets: vec![
                target("日比谷公園", "テニス（人工芝）", 3, 9),
                target("芝公園, 第二", "テニス（ハード）", 4, 11),
            ],
        }
    }

    #[test]
    fn round_trip_reproduces_assignments_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("lotteryInfo.csv");
        let members: Vec<Member> = (1..=3)
            .map(|i| Member::new(format!("1000{i}"), format!("会員{i}"), format!("p\"w{i}")))
            .collect();
        let mut assignments = distribute(&members, &setting());
        assignments.reverse();

        write_lottery_info(&path, &assignments).unwrap();
        let read = read_lottery_info(&path).unwrap();

        assignments.sort_by_key(|a| a.lottery_no);
        assert_eq!(read, assignments);
    }

    #[test]
    fn header_has_fixed_column_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lotteryInfo.csv");
        let members = vec![Member::new("10001", "Sato", "pw")];
        write_lottery_info(&path, &distribute(&members, &setting())).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("lotteryNo,memberName,memberId,password,courtType,courtName,month,date,startHour")
        );
        assert_eq!(
            lines.next(),
            Some("1,Sato,10001,pw,テニス（人工芝）,日比谷公園,11,2026-11-03,9")
        );
    }
}
