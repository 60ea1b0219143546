use serde::Serialize;

use crate::config::Config;

/// RFC 8414 authorization server metadata document. Built once at startup
/// from `Config` and held in `AppState` for the life of the process — the
/// one process-wide cache besides `KeyManager`'s JWKS.
#[derive(Debug, Clone, Serialize)]
pub struct OauthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub scopes_supported: Vec<String>,
    pub mcp_protocol_version: String,
}

impl OauthServerMetadata {
    pub fn build(config: &Config) -> Self {
        let issuer = config.issuer_url.clone();
        Self {
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            registration_endpoint: format!("{issuer}/register"),
            revocation_endpoint: format!("{issuer}/revoke"),
            introspection_endpoint: format!("{issuer}/introspect"),
            jwks_uri: format!("{issuer}/jwks"),
            issuer,
            response_types_supported: vec!["code"],
            grant_types_supported: vec!["authorization_code", "refresh_token"],
            code_challenge_methods_supported: vec!["S256"],
            token_endpoint_auth_methods_supported: vec![
                "none",
                "client_secret_post",
                "client_secret_basic",
            ],
            scopes_supported: config.supported_scopes.clone(),
            mcp_protocol_version: config.protocol_version.clone(),
        }
    }
}
