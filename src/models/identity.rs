use serde::{Deserialize, Serialize};

/// The resolved identity of a human user, as reported by the external IdP.
///
/// `sub` is GitHub's numeric user id, stringified, so it stays stable
/// across username changes even though `login` does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub sub: String,
    pub login: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}
