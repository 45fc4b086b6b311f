//! The application data directory: profiles, per-profile rosters and
//! lottery settings as pretty-printed JSON, plus a `logs/` subdirectory for
//! lane logs and CSV output.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use courtlot_core::{LotterySetting, Member};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::StoreError;

const APP_DIR: &str = "tennis-court-manager";
const PROFILES_FILE: &str = "profiles.json";
const LOGS_DIR: &str = "logs";
const LOTTERY_INFO_FILE: &str = "lotteryInfo.csv";
const STATUS_FILE: &str = "applicationStatus.csv";

pub const DEFAULT_PROFILE_ID: &str = "default";
pub const DEFAULT_PROFILE_NAME: &str = "デフォルト";

/// A named roster and its lottery setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Platform location of the data directory.
///
/// `%APPDATA%` on Windows, `~/Library/Application Support` on macOS,
/// `$XDG_CONFIG_HOME` or `~/.config` elsewhere.
pub fn default_root() -> Result<PathBuf, StoreError> {
    let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
    let base = if cfg!(windows) {
        var("APPDATA")
    } else if cfg!(target_os = "macos") {
        var("HOME").map(|home| home.join("Library").join("Application Support"))
    } else {
        var("XDG_CONFIG_HOME").or_else(|| var("HOME").map(|home| home.join(".config")))
    };
    base.map(|b| b.join(APP_DIR)).ok_or(StoreError::NoDataDir)
}

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open at `root`, creating it and `logs/` if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = Self::new(root);
        fs::create_dir_all(dir.logs_dir()).map_err(StoreError::io(dir.logs_dir()))?;
        debug!(root = %dir.root.display(), "data directory ready");
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn lottery_info_path(&self) -> PathBuf {
        self.logs_dir().join(LOTTERY_INFO_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.logs_dir().join(STATUS_FILE)
    }

    fn profiles_path(&self) -> PathBuf {
        self.root.join(PROFILES_FILE)
    }

    fn members_path(&self, profile_id: &str) -> PathBuf {
        self.root.join(format!("profile_{profile_id}.json"))
    }

    fn setting_path(&self, profile_id: &str) -> PathBuf {
        self.root.join(format!("lottery-setting_{profile_id}.json"))
    }

    // ── Profiles ──

    pub fn load_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        self.ensure_default_profile()?;
        read_json(&self.profiles_path())
    }

    pub fn save_profiles(&self, profiles: &[Profile]) -> Result<(), StoreError> {
        write_json(&self.profiles_path(), &profiles)
    }

    /// Write a profile list holding only the default profile if there is
    /// none yet.
    pub fn ensure_default_profile(&self) -> Result<(), StoreError> {
        let path = self.profiles_path();
        if path.exists() {
            return Ok(());
        }
        info!(path = %path.display(), "creating default profile");
        write_json(
            &path,
            &[Profile::new(DEFAULT_PROFILE_ID, DEFAULT_PROFILE_NAME)],
        )
    }

    /// Drop the profile from the list and delete its roster and setting.
    pub fn delete_profile(&self, profile_id: &str) -> Result<(), StoreError> {
        let mut profiles = self.load_profiles()?;
        profiles.retain(|p| p.id != profile_id);
        self.save_profiles(&profiles)?;
        remove_if_exists(&self.members_path(profile_id))?;
        remove_if_exists(&self.setting_path(profile_id))?;
        info!(profile = profile_id, "profile deleted");
        Ok(())
    }

    // ── Members ──

    /// The profile's roster; an empty one is written if none exists.
    pub fn load_members(&self, profile_id: &str) -> Result<Vec<Member>, StoreError> {
        let path = self.members_path(profile_id);
        if !path.exists() {
            write_json(&path, &Vec::<Member>::new())?;
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    pub fn save_members(&self, profile_id: &str, members: &[Member]) -> Result<(), StoreError> {
        write_json(&self.members_path(profile_id), &members)
    }

    // ── Lottery setting ──

    pub fn load_lottery_setting(&self, profile_id: &str) -> Result<Option<LotterySetting>, StoreError> {
        let path = self.setting_path(profile_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn save_lottery_setting(
        &self,
        profile_id: &str,
        setting: &LotterySetting,
    ) -> Result<(), StoreError> {
        write_json(&self.setting_path(profile_id), setting)
    }
}

/// Read a JSON document from any path.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path).map_err(StoreError::io(path))?;
    serde_json::from_str(&text).map_err(StoreError::json(path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(StoreError::json(path))?;
    fs::write(path, text).map_err(StoreError::io(path))
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::io(path)(e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use courtlot_core::{CourtSpec, TargetSpec};

    use super::*;

    fn data_dir() -> (tempfile::TempDir, DataDir) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::open(tmp.path().join("data")).unwrap();
        (tmp, dir)
    }

    #[test]
    fn default_profile_created_on_first_load() {
        let (_tmp, dir) = data_dir();
        let profiles = dir.load_profiles().unwrap();
        assert_eq!(profiles, vec![Profile::new("default", "デフォルト")]);
        assert!(dir.logs_dir().is_dir());
    }

    #[test]
    fn delete_profile_removes_roster_and_tolerates_missing_files() {
        let (_tmp, dir) = data_dir();
        dir.save_profiles(&[Profile::new("default", "デフォルト"), Profile::new("club", "Club")])
            .unwrap();
        dir.save_members("club", &[Member::new("10001", "Sato", "pw")]).unwrap();
        dir.delete_profile("club").unwrap();
        assert_eq!(dir.load_profiles().unwrap().len(), 1);
        assert!(!dir.members_path("club").exists());
        // Nothing on disk for this one.
        dir.delete_profile("ghost").unwrap();
    }

    #[test]
    fn missing_roster_is_created_empty() {
        let (_tmp, dir) = data_dir();
        assert!(dir.load_members("default").unwrap().is_empty());
        assert!(dir.members_path("default").exists());
    }

    #[test]
    fn members_round_trip_with_key() {
        let (_tmp, dir) = data_dir();
        let mut member = Member::new("10001", "Sato", "pw");
        member.key = Some("row-1".into());
        dir.save_members("default", &[member.clone()]).unwrap();
        assert_eq!(dir.load_members("default").unwrap(), vec![member]);
    }

    #[test]
    fn setting_round_trip() {
        let (_tmp, dir) = data_dir();
        assert_eq!(dir.load_lottery_setting("default").unwrap(), None);
        let setting = LotterySetting {
            month: 11,
            targets: vec![TargetSpec {
                court: CourtSpec {
                    name: "日比谷公園".into(),
                    kind: "テニス（ハード）".into(),
                },
                date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
                start_hour: 9,
            }],
        };
        dir.save_lottery_setting("default", &setting).unwrap();
        assert_eq!(dir.load_lottery_setting("default").unwrap(), Some(setting));
        let raw = fs::read_to_string(dir.setting_path("default")).unwrap();
        assert!(raw.contains("\"startHour\": 9"));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let (_tmp, dir) = data_dir();
        fs::write(dir.members_path("default"), "{ nope").unwrap();
        let err = dir.load_members("default").unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
        assert!(err.to_string().contains("profile_default.json"));
    }
}
