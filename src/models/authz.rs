use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UserIdentity;

/// Created when `/authorize` is accepted; stored under `oauth:state:{state}`
/// keyed by the IdP-facing state value. Single-use: consumed by `/callback`
/// via `Store::take_once`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequestState {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub client_state: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Issued at the end of `/callback`; stored under `oauth:code:{code}`.
/// Single-use: consumed by `/token` via `Store::take_once`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub identity: UserIdentity,
    pub issued_at: DateTime<Utc>,
}
