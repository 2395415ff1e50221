use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticket lifecycle state. Open and In Progress are interchangeable working
/// states; Closed is terminal for non-staff.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Closed,
}

impl TicketStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "In Progress" => Ok(Self::InProgress),
            "Closed" => Ok(Self::Closed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ticket status: {0}")]
pub struct UnknownStatus(pub String);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TicketPriority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// Critical is a valid stored value but is not offered at creation; it is
    /// only reachable through a later staff update.
    #[must_use]
    pub const fn creatable(self) -> bool {
        !matches!(self, Self::Critical)
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Normal" => Ok(Self::Normal),
            "High" => Ok(Self::High),
            "Critical" => Ok(Self::Critical),
            other => Err(UnknownPriority(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ticket priority: {0}")]
pub struct UnknownPriority(pub String);

/// Whether `from -> to` is a legal status transition for an actor of the
/// given staffing level. Same-state "transitions" are always legal no-ops;
/// anything touching Closed requires staff.
#[must_use]
pub const fn transition_allowed(from: TicketStatus, to: TicketStatus, staff: bool) -> bool {
    use TicketStatus::{Closed, InProgress, Open};

    match (from, to) {
        (Open | InProgress, Open | InProgress) | (Closed, Closed) => true,
        (Open | InProgress, Closed) | (Closed, Open | InProgress) => staff,
    }
}
