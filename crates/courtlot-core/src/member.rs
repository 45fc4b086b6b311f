//! Roster members and their login credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::DispatchItem;

/// A login password for the booking site.
///
/// Serialised transparently so roster files keep their plain shape, but never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One roster member. Identity is `id` (the site's user number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Row key used by roster editors; carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub id: String,
    pub name: String,
    pub password: Password,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            key: None,
            id: id.into(),
            name: name.into(),
            password: Password::new(password),
        }
    }
}

/// A member paired with its roster position, the unit of work for the
/// result and status protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub sequence_no: u32,
    pub member: Member,
}

impl DispatchItem for RosterEntry {
    fn sequence_no(&self) -> u32 {
        self.sequence_no
    }

    fn member(&self) -> &Member {
        &self.member
    }
}

/// Number a roster in row order, starting at 1.
pub fn roster(members: &[Member]) -> Vec<RosterEntry> {
    members
        .iter()
        .zip(1u32..)
        .map(|(member, sequence_no)| RosterEntry {
            sequence_no,
            member: member.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_debug_is_redacted() {
        let member = Member::new("10001", "Sato", "hunter2");
        let printed = format!("{member:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("Password(***)"));
    }

    #[test]
    fn member_json_keeps_plain_password() {
        let json = r#"{"key":"1","id":"10001","name":"Sato","password":"pw"}"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert_eq!(member.key.as_deref(), Some("1"));
        assert_eq!(member.password.expose(), "pw");

        let back = serde_json::to_string(&member).unwrap();
        assert!(back.contains(r#""password":"pw""#));
    }

    #[test]
    fn member_without_key_omits_it() {
        let back = serde_json::to_string(&Member::new("1", "A", "p")).unwrap();
        assert!(!back.contains("key"));
    }

    #[test]
    fn roster_numbers_from_one_in_row_order() {
        let members = vec![Member::new("a", "A", "p"), Member::new("b", "B", "p")];
        let entries = roster(&members);
        assert_eq!(entries[0].sequence_no, 1);
        assert_eq!(entries[1].sequence_no, 2);
        assert_eq!(entries[1].member.id, "b");
    }
}
