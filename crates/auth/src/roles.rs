use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role held by a user within its tenant.
///
/// Roles form a total order; holding a role grants every capability required
/// by any lower role. Comparisons go through [`Role::rank`] so the hierarchy
/// lives in exactly one place.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Coach,
    BranchManager,
    SystemManager,
}

impl Role {
    /// All roles, lowest first.
    pub const ALL: [Role; 4] = [
        Role::Student,
        Role::Coach,
        Role::BranchManager,
        Role::SystemManager,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Role::Student => 0,
            Role::Coach => 1,
            Role::BranchManager => 2,
            Role::SystemManager => 3,
        }
    }

    /// True if this role carries every capability of `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Coach => "coach",
            Role::BranchManager => "branch_manager",
            Role::SystemManager => "system_manager",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
