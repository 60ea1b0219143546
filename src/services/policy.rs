use crate::models::identity::UserIdentity;

/// Pure decision function: may this authenticated IdP identity receive a
/// token? Configured as an allow-list of logins, or `*` for any
/// authenticated user.
pub struct AccessPolicy {
    allowlist: Vec<String>,
}

impl AccessPolicy {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    pub fn allows(&self, identity: &UserIdentity) -> bool {
        self.allowlist.iter().any(|entry| entry == "*" || entry == &identity.login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(login: &str) -> UserIdentity {
        UserIdentity {
            sub: "1".to_string(),
            login: login.to_string(),
            display_name: None,
            email: None,
        }
    }

    #[test]
    fn wildcard_allows_any_identity() {
        let policy = AccessPolicy::new(vec!["*".to_string()]);
        assert!(policy.allows(&identity("anyone")));
    }

    #[test]
    fn allowlist_rejects_unlisted_login() {
        let policy = AccessPolicy::new(vec!["alice".to_string()]);
        assert!(policy.allows(&identity("alice")));
        assert!(!policy.allows(&identity("mallory")));
    }
}
