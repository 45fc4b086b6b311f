//! Roster status as CSV: one row per listing record, then one row per member
//! whose status could not be read.

use std::fs::{self, File};
use std::path::Path;

use courtlot_core::{Member, StatusRecord};
use serde::Serialize;
use tracing::info;

use crate::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRow<'a> {
    kind: &'a str,
    member_id: &'a str,
    member_name: &'a str,
    court: &'a str,
    date: &'a str,
    time: &'a str,
    detail: &'a str,
}

pub fn write_status_csv(
    path: &Path,
    records: &[StatusRecord],
    login_failed: &[Member],
    errors: &[(Member, String)],
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    let file = File::create(path).map_err(StoreError::io(path))?;
    let mut writer = csv::Writer::from_writer(file);

    let listed = records.iter().map(|r| StatusRow {
        kind: r.kind.as_str(),
        member_id: &r.member_id,
        member_name: &r.member_name,
        court: &r.court,
        date: &r.date,
        time: &r.time,
        detail: "",
    });
    let rejected = login_failed.iter().map(|m| unread("login-failed", m, ""));
    let failed = errors.iter().map(|(m, detail)| unread("error", m, detail));

    for row in listed.chain(rejected).chain(failed) {
        writer.serialize(row).map_err(StoreError::csv(path))?;
    }
    writer.flush().map_err(StoreError::io(path))?;
    info!(
        path = %path.display(),
        records = records.len(),
        login_failed = login_failed.len(),
        errors = errors.len(),
        "status written"
    );
    Ok(())
}

fn unread<'a>(kind: &'a str, member: &'a Member, detail: &'a str) -> StatusRow<'a> {
    StatusRow {
        kind,
        member_id: &member.id,
        member_name: &member.name,
        court: "",
        date: "",
        time: "",
        detail,
    }
}

#[cfg(test)]
mod tests {
    use courtlot_core::StatusKind;

    use super::*;

    #[test]
    fn writes_records_then_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("applicationStatus.csv");
        let records = vec![StatusRecord {
            kind: StatusKind::Reservation,
            member_id: "10001".into(),
            member_name: "Sato".into(),
            court: "日比谷公園".into(),
            date: "2026/11/3".into(),
            time: "9:00".into(),
        }];
        let rejected = vec![Member::new("10002", "Suzuki", "pw")];
        let errors = vec![(Member::new("10003", "Takahashi", "pw"), "timed out".to_string())];

        write_status_csv(&path, &records, &rejected, &errors).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "kind,memberId,memberName,court,date,time,detail");
        assert_eq!(lines[1], "reservation,10001,Sato,日比谷公園,2026/11/3,9:00,");
        assert_eq!(lines[2], "login-failed,10002,Suzuki,,,,");
        assert_eq!(lines[3], "error,10003,Takahashi,,,,timed out");
        assert!(!text.contains("pw"));
    }
}
