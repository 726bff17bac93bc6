//! Resolved request principals and well-known role names.
//!
//! Token validation happens in the API facade; everything below it only
//! sees an already-resolved [`Principal`].

/// Full platform access: all tasks, admin maintenance endpoints.
pub const ROLE_ADMIN: &str = "admin";
/// May submit tasks and manage their own.
pub const ROLE_OPERATOR: &str = "operator";
/// Read-only access to their own tasks and queue stats.
pub const ROLE_VIEWER: &str = "viewer";

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
}

impl Principal {
    /// Admins see every task; everyone else is scoped to their own.
    pub fn has_global_view(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Viewers cannot submit work.
    pub fn can_submit(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_OPERATOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: &str) -> Principal {
        Principal {
            user_id: "u1".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn admin_has_global_view() {
        assert!(principal(ROLE_ADMIN).has_global_view());
    }

    #[test]
    fn operator_is_owner_scoped() {
        assert!(!principal(ROLE_OPERATOR).has_global_view());
    }

    #[test]
    fn viewer_cannot_submit() {
        assert!(!principal(ROLE_VIEWER).can_submit());
        assert!(principal(ROLE_OPERATOR).can_submit());
        assert!(principal(ROLE_ADMIN).can_submit());
    }
}
