//! On-disk state: the data directory with profiles, rosters and lottery
//! settings, the CSV files a run reads and writes, and per-lane log files.

mod data_dir;
mod error;
mod file_log;
mod lottery_info;
mod members;
mod status_export;

pub use data_dir::{DEFAULT_PROFILE_ID, DataDir, Profile, default_root, read_json};
pub use error::StoreError;
pub use file_log::FileLogs;
pub use lottery_info::{read_lottery_info, write_lottery_info};
pub use members::{import_members_csv, read_members_csv};
pub use status_export::write_status_csv;
