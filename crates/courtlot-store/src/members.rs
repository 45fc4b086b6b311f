//! Roster import from the `ID,PW,名前` spreadsheet export.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use courtlot_core::Member;
use serde::Deserialize;
use tracing::info;

use crate::StoreError;

#[derive(Debug, Deserialize)]
struct MemberRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "PW")]
    password: String,
    #[serde(rename = "名前")]
    name: String,
}

/// Read members from a CSV file. Row order is roster order.
pub fn import_members_csv(path: &Path) -> Result<Vec<Member>, StoreError> {
    let file = File::open(path).map_err(StoreError::io(path))?;
    let members = read_members_csv(file).map_err(StoreError::csv(path))?;
    info!(path = %path.display(), count = members.len(), "members imported");
    Ok(members)
}

pub fn read_members_csv<R: Read>(reader: R) -> Result<Vec<Member>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<MemberRow>()
        .map(|row| row.map(|r| Member::new(r.id, r.name, r.password)))
        .collect()
}
