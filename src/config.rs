use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::services::authorize::AuthorizationEngine;
use crate::services::clients::ClientRegistry;
use crate::services::discovery::OauthServerMetadata;
use crate::services::keys::KeyManager;
use crate::services::token::TokenService;
use crate::store::Store;

/// Signing algorithm for access tokens.
///
/// RS256 is the production path. HS256 exists only to bootstrap a
/// development deployment that has not yet provisioned an RSA key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigningAlgorithm {
    Rs256,
    Hs256,
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RS256" => Ok(Self::Rs256),
            "HS256" => Ok(Self::Hs256),
            other => anyhow::bail!("unsupported SIGNING_ALGORITHM: {other}"),
        }
    }
}

/// Process-wide configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    // External IdP (GitHub authorization-code flow)
    pub idp_client_id: String,
    pub idp_client_secret: String,
    pub idp_authorize_url: String,
    pub idp_token_url: String,
    pub idp_userinfo_url: String,

    // Signing
    pub signing_algorithm: SigningAlgorithm,
    pub private_key_pem: Option<String>,
    pub symmetric_secret: Option<String>,
    pub allow_symmetric_bootstrap: bool,

    // Issuer / lifetimes
    pub issuer_url: String,
    pub access_token_lifetime_secs: i64,
    pub refresh_token_lifetime_secs: i64,
    pub authz_state_ttl_secs: i64,
    pub authorization_code_ttl_secs: i64,
    pub client_lifetime_secs: i64,

    // Access control
    pub allowlist: Vec<String>,

    // Storage
    pub redis_url: String,

    // Server
    pub bind_host: String,
    pub bind_port: u16,

    // Ambient
    pub idp_request_timeout_secs: u64,
    pub protocol_version: String,
    pub supported_scopes: Vec<String>,
}

fn env_var(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let signing_algorithm: SigningAlgorithm =
            env_var_or("SIGNING_ALGORITHM", "RS256").parse()?;
        let allow_symmetric_bootstrap = env_var_or("ALLOW_SYMMETRIC_BOOTSTRAP", "false")
            .parse()
            .unwrap_or(false);

        let private_key_pem = match std::env::var("SIGNING_KEY_B64") {
            Ok(b64) => {
                let bytes = STANDARD
                    .decode(b64.trim())
                    .map_err(|e| anyhow::anyhow!("SIGNING_KEY_B64 is not valid base64: {e}"))?;
                Some(String::from_utf8(bytes)?)
            }
            Err(_) => None,
        };
        let symmetric_secret = std::env::var("SYMMETRIC_SECRET").ok();

        if signing_algorithm == SigningAlgorithm::Rs256 && private_key_pem.is_none() {
            anyhow::bail!("SIGNING_KEY_B64 is required when SIGNING_ALGORITHM=RS256");
        }
        if signing_algorithm == SigningAlgorithm::Hs256 {
            if !allow_symmetric_bootstrap {
                anyhow::bail!(
                    "SIGNING_ALGORITHM=HS256 requires ALLOW_SYMMETRIC_BOOTSTRAP=true; \
                     RS256 is the only supported production signing algorithm"
                );
            }
            if symmetric_secret.is_none() {
                anyhow::bail!("SYMMETRIC_SECRET is required when SIGNING_ALGORITHM=HS256");
            }
        }

        let allowlist: Vec<String> = env_var("ACCESS_ALLOWLIST")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let supported_scopes: Vec<String> = env_var_or("SUPPORTED_SCOPES", "openid profile")
            .split_whitespace()
            .map(String::from)
            .collect();

        Ok(Self {
            idp_client_id: env_var("IDP_CLIENT_ID")?,
            idp_client_secret: env_var("IDP_CLIENT_SECRET")?,
            idp_authorize_url: env_var_or(
                "IDP_AUTHORIZE_URL",
                "https://github.com/login/oauth/authorize",
            ),
            idp_token_url: env_var_or(
                "IDP_TOKEN_URL",
                "https://github.com/login/oauth/access_token",
            ),
            idp_userinfo_url: env_var_or("IDP_USERINFO_URL", "https://api.github.com/user"),

            signing_algorithm,
            private_key_pem,
            symmetric_secret,
            allow_symmetric_bootstrap,

            issuer_url: env_var("ISSUER_URL")?.trim_end_matches('/').to_string(),
            access_token_lifetime_secs: env_var_or("ACCESS_TOKEN_LIFETIME_SECS", "1800").parse()?,
            refresh_token_lifetime_secs: env_var_or("REFRESH_TOKEN_LIFETIME_SECS", "2592000")
                .parse()?,
            authz_state_ttl_secs: env_var_or("AUTHORIZATION_STATE_TTL_SECS", "300").parse()?,
            authorization_code_ttl_secs: env_var_or("AUTHORIZATION_CODE_TTL_SECS", "60").parse()?,
            client_lifetime_secs: env_var_or("CLIENT_LIFETIME_SECS", "0").parse()?,

            allowlist,

            redis_url: env_var_or("REDIS_URL", "redis://127.0.0.1:6379"),

            bind_host: env_var_or("BIND_HOST", "0.0.0.0"),
            bind_port: env_var_or("BIND_PORT", "8080").parse()?,

            idp_request_timeout_secs: env_var_or("IDP_REQUEST_TIMEOUT_SECS", "10").parse()?,
            protocol_version: env_var_or("MCP_PROTOCOL_VERSION", "2025-06-18"),
            supported_scopes,
        })
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.bind_host, self.bind_port)
            .parse()
            .expect("invalid BIND_HOST/BIND_PORT")
    }

    /// `true` if every authenticated IdP login is allowed (wildcard policy).
    pub fn allows_any_identity(&self) -> bool {
        self.allowlist.iter().any(|entry| entry == "*")
    }
}

/// Shared application state, constructed once at startup and handed to
/// every request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub keys: Arc<KeyManager>,
    pub http: reqwest::Client,
    pub metadata: Arc<OauthServerMetadata>,
    pub clients: Arc<ClientRegistry>,
    pub tokens: Arc<TokenService>,
    pub engine: Arc<AuthorizationEngine>,
}

impl AppState {
    pub fn new(config: Config, store: Store, keys: KeyManager) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.idp_request_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let metadata = OauthServerMetadata::build(&config);
        let keys = Arc::new(keys);

        let clients = Arc::new(ClientRegistry::new(store.clone(), &config));
        let tokens = Arc::new(TokenService::new(store.clone(), keys.clone(), &config));
        let idp = Arc::new(crate::services::idp::IdPClient::new(&config)?);
        let policy = Arc::new(crate::services::policy::AccessPolicy::new(config.allowlist.clone()));
        let engine = Arc::new(AuthorizationEngine::new(
            store.clone(),
            clients.clone(),
            tokens.clone(),
            idp,
            policy,
            config.authz_state_ttl_secs,
            config.authorization_code_ttl_secs,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            keys,
            http,
            metadata: Arc::new(metadata),
            clients,
            tokens,
            engine,
        })
    }
}
