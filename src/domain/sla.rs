use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ticket::TicketPriority;

/// Derived on-time classification for a ticket. Computed on every read from
/// the current wall clock; never stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SlaState {
    OnTime,
    AtRisk,
    Overdue,
}

/// Response-time budget in hours for each priority tier.
#[must_use]
pub const fn threshold_hours(priority: TicketPriority) -> f64 {
    match priority {
        TicketPriority::Low => 72.0,
        TicketPriority::Normal => 24.0,
        TicketPriority::High => 4.0,
        TicketPriority::Critical => 1.0,
    }
}

/// Classify a ticket's age against its priority budget. On-time up to the
/// threshold, at-risk up to 1.5x, overdue beyond that.
#[must_use]
pub fn evaluate(priority: TicketPriority, created_at: DateTime<Utc>, now: DateTime<Utc>) -> SlaState {
    let hours = (now - created_at).num_seconds() as f64 / 3600.0;
    let threshold = threshold_hours(priority);

    if hours <= threshold {
        SlaState::OnTime
    } else if hours <= threshold * 1.5 {
        SlaState::AtRisk
    } else {
        SlaState::Overdue
    }
}

/// Parse a stored RFC 3339 timestamp and classify against `now`. Unparseable
/// timestamps count as on-time rather than poisoning the whole listing.
#[must_use]
pub fn evaluate_str(priority: TicketPriority, created_at: &str, now: DateTime<Utc>) -> SlaState {
    DateTime::parse_from_rfc3339(created_at).map_or(SlaState::OnTime, |created| {
        evaluate(priority, created.with_timezone(&Utc), now)
    })
}
