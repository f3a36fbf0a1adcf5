//! Identity collaborator: who is editing, for audit and logging only. The
//! core performs no authentication itself.

/// Supplies the current authenticated user, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

/// Environment-backed identity: `SHOPFLOW_USER` first, then the login
/// `USER`.
#[derive(Debug, Clone, Default)]
pub struct EnvIdentity;

impl IdentityProvider for EnvIdentity {
    fn current_user(&self) -> Option<String> {
        std::env::var("SHOPFLOW_USER")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|v| !v.trim().is_empty()))
    }
}

/// Audit context stamped into logs and promotion notifications.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub user: Option<String>,
    pub hostname: String,
}

impl AuditContext {
    pub fn capture(identity: &dyn IdentityProvider) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        Self {
            user: identity.current_user(),
            hostname,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIdentity(Option<String>);

    impl IdentityProvider for FixedIdentity {
        fn current_user(&self) -> Option<String> {
            self.0.clone()
        }
    }

    #[test]
    fn test_audit_context_carries_user_and_hostname() {
        let context = AuditContext::capture(&FixedIdentity(Some("kim".to_string())));
        assert_eq!(context.user.as_deref(), Some("kim"));
        assert!(!context.hostname.is_empty());
    }

    #[test]
    fn test_audit_context_tolerates_anonymous_sessions() {
        let context = AuditContext::capture(&FixedIdentity(None));
        assert!(context.user.is_none());
    }
}
