pub mod policy;
pub mod role;
pub mod sla;
pub mod ticket;

pub use policy::{Action, Actor};
pub use role::Role;
pub use sla::SlaState;
pub use ticket::{TicketPriority, TicketStatus};
