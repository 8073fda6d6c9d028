//! Spend-tracked entities
//!
//! Four kinds are tracked: users, teams, organizations and API keys. They
//! form a loose hierarchy (key → user → team → organization) that the
//! gateway does not enforce, so any parent link may be missing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Placeholder published when an alias or name is missing
pub const NO_ALIAS: &str = "none";

/// Entity type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Internal gateway user
    User,
    /// Team of users
    Team,
    /// Organization owning teams
    Organization,
    /// Virtual API key
    Key,
}

impl EntityKind {
    /// Label value used for the `entity_type` label
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Team => "team",
            EntityKind::Organization => "organization",
            EntityKind::Key => "key",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "team" => Ok(EntityKind::Team),
            "organization" => Ok(EntityKind::Organization),
            "key" => Ok(EntityKind::Key),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_label_value() {
        for kind in [
            EntityKind::User,
            EntityKind::Team,
            EntityKind::Organization,
            EntityKind::Key,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("tenant".parse::<EntityKind>().is_err());
    }
}
