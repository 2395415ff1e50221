use super::role::Role;

/// The authenticated identity a request acts as, resolved once by the auth
/// middleware and threaded explicitly into every service call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub const fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    #[must_use]
    pub const fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Every operation that consults the authorization policy. Workflow-level
/// constraints (which transitions are legal, whether the ticket is assigned)
/// live in the ticket state machine, not here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    CreateTicket,
    ViewTicket,
    /// Edit title/description.
    EditTicketBody,
    /// Move a ticket between working states.
    EditTicketStatus,
    EditTicketPriority,
    AssignTicket,
    CloseTicket,
    CommentOnTicket,
    AttachToTicket,
    ListUsers,
    ChangeRole,
    ViewAudit,
}

/// Single decision point for role-based access. `owner` is the resource
/// owner when the resource has one (a ticket's creator); `None` for global
/// resources like the user directory or the audit log.
#[must_use]
pub fn allows(actor: Actor, action: Action, owner: Option<i64>) -> bool {
    let owns = owner == Some(actor.id);

    match actor.role {
        Role::Admin => true,
        Role::Tech => !matches!(action, Action::ChangeRole | Action::ViewAudit),
        Role::User => match action {
            Action::CreateTicket => true,
            Action::ViewTicket
            | Action::EditTicketBody
            | Action::EditTicketStatus
            | Action::CommentOnTicket
            | Action::AttachToTicket => owns,
            Action::EditTicketPriority
            | Action::AssignTicket
            | Action::CloseTicket
            | Action::ListUsers
            | Action::ChangeRole
            | Action::ViewAudit => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: i64 = 7;
    const OTHER: i64 = 8;

    fn user(id: i64) -> Actor {
        Actor::new(id, Role::User)
    }

    #[test]
    fn admin_is_unrestricted() {
        let admin = Actor::new(1, Role::Admin);
        for action in [
            Action::CreateTicket,
            Action::AssignTicket,
            Action::CloseTicket,
            Action::ChangeRole,
            Action::ViewAudit,
        ] {
            assert!(allows(admin, action, Some(OTHER)));
        }
    }

    #[test]
    fn tech_triages_but_cannot_administer() {
        let tech = Actor::new(2, Role::Tech);

        assert!(allows(tech, Action::ViewTicket, Some(OTHER)));
        assert!(allows(tech, Action::AssignTicket, Some(OTHER)));
        assert!(allows(tech, Action::CloseTicket, Some(OTHER)));
        assert!(allows(tech, Action::EditTicketPriority, Some(OTHER)));
        assert!(allows(tech, Action::ListUsers, None));

        assert!(!allows(tech, Action::ChangeRole, None));
        assert!(!allows(tech, Action::ViewAudit, None));
    }

    #[test]
    fn user_is_scoped_to_own_tickets() {
        assert!(allows(user(OWNER), Action::ViewTicket, Some(OWNER)));
        assert!(allows(user(OWNER), Action::CommentOnTicket, Some(OWNER)));
        assert!(allows(user(OWNER), Action::AttachToTicket, Some(OWNER)));
        assert!(allows(user(OWNER), Action::EditTicketStatus, Some(OWNER)));

        assert!(!allows(user(OTHER), Action::ViewTicket, Some(OWNER)));
        assert!(!allows(user(OTHER), Action::CommentOnTicket, Some(OWNER)));
    }

    #[test]
    fn user_never_holds_staff_powers() {
        for action in [
            Action::AssignTicket,
            Action::CloseTicket,
            Action::EditTicketPriority,
            Action::ListUsers,
            Action::ChangeRole,
            Action::ViewAudit,
        ] {
            // Owning the ticket makes no difference for staff-only actions.
            assert!(!allows(user(OWNER), action, Some(OWNER)));
        }
    }
}
