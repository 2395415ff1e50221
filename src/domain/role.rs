use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Stored as plain text in the users table; parsed at the
/// repository boundary so the rest of the code only sees the enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Tech,
    Admin,
}

impl Role {
    /// Techs and admins triage tickets; everything gated on "staff" in the
    /// workflow rules means exactly this pair.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Tech | Self::Admin)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Tech => "tech",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "tech" => Ok(Self::Tech),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);
