use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    None,
    ClientSecretPost,
    ClientSecretBasic,
}

/// A registered OAuth client. Persisted under `oauth:client:{client_id}`.
///
/// `id` is an internal correlation key distinct from the bearer-exposed
/// `client_id`, so log lines and `tracing` spans never need to carry the
/// public identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: uuid::Uuid,
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub scope: String,
    pub registration_access_token_hash: String,
    pub registration_client_uri: String,
    pub issued_at: DateTime<Utc>,
    /// `None` means the client never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == TokenEndpointAuthMethod::None
    }

    pub fn supports_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Exact match after normalising only the scheme and host case, per
    /// §4.6's redirect-URI comparison rule. The path, query, and any
    /// trailing-slash-sensitive segment are compared byte-for-byte.
    pub fn has_redirect_uri(&self, candidate: &str) -> bool {
        let Some(candidate) = normalize_redirect_uri(candidate) else {
            return false;
        };
        self.redirect_uris
            .iter()
            .any(|registered| normalize_redirect_uri(registered).as_deref() == Some(&candidate))
    }
}

fn normalize_redirect_uri(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let mut normalized = parsed.clone();
    normalized.set_scheme(&parsed.scheme().to_ascii_lowercase()).ok()?;
    if let Some(host) = parsed.host_str() {
        normalized.set_host(Some(&host.to_ascii_lowercase())).ok()?;
    }
    Some(normalized.to_string())
}
