use std::sync::Arc;

use chrono::Utc;

use crate::dto::oauth::{AuthorizeQuery, CallbackQuery, IntrospectRequest, IntrospectResponse, RevokeRequest, TokenRequest, TokenResponse};
use crate::error::OAuthError;
use crate::models::authz::{AuthorizationCode, AuthorizationRequestState};
use crate::models::client::{Client, GrantType};
use crate::services::clients::ClientRegistry;
use crate::services::idp::{IdPClient, IdpError};
use crate::services::policy::AccessPolicy;
use crate::services::token::{TokenError, TokenService};
use crate::store::{keys, Store};
use crate::utils::{pkce, secret};

/// No trustworthy redirect URI is available for this failure — the caller
/// must render `/error`, not redirect.
pub struct UntrustedFailure(pub String);

pub enum AuthorizeOutcome {
    RedirectToIdp(url::Url),
    /// Client and redirect URI are both validated; some other parameter was
    /// invalid. Redirect back with `error`/`state`.
    RedirectWithError {
        redirect_uri: String,
        error: &'static str,
        state: Option<String>,
    },
}

pub enum CallbackOutcome {
    RedirectWithCode {
        redirect_uri: String,
        code: String,
        state: Option<String>,
    },
    RedirectAccessDenied {
        redirect_uri: String,
        state: Option<String>,
    },
}

/// The request-facing state machine spanning `/authorize`, `/callback`,
/// `/token`, `/revoke`, `/introspect`. Every transition consumes the prior
/// state atomically via `Store::take_once`, so no code or state value can
/// be reused under any interleaving.
pub struct AuthorizationEngine {
    store: Store,
    clients: Arc<ClientRegistry>,
    tokens: Arc<TokenService>,
    idp: Arc<IdPClient>,
    policy: Arc<AccessPolicy>,
    authz_state_ttl_secs: i64,
    authorization_code_ttl_secs: i64,
}

impl AuthorizationEngine {
    pub fn new(
        store: Store,
        clients: Arc<ClientRegistry>,
        tokens: Arc<TokenService>,
        idp: Arc<IdPClient>,
        policy: Arc<AccessPolicy>,
        authz_state_ttl_secs: i64,
        authorization_code_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            clients,
            tokens,
            idp,
            policy,
            authz_state_ttl_secs,
            authorization_code_ttl_secs,
        }
    }

    pub async fn authorize(
        &self,
        query: AuthorizeQuery,
    ) -> Result<AuthorizeOutcome, UntrustedFailure> {
        let client = self
            .clients
            .get(&query.client_id)
            .await
            .map_err(|_| UntrustedFailure("Unknown client.".to_string()))?;

        if !client.has_redirect_uri(&query.redirect_uri) {
            return Err(UntrustedFailure(
                "redirect_uri is not registered for this client.".to_string(),
            ));
        }

        if query.response_type != "code" {
            return Ok(AuthorizeOutcome::RedirectWithError {
                redirect_uri: query.redirect_uri,
                error: "unsupported_response_type",
                state: query.state,
            });
        }

        let method = query.code_challenge_method.as_deref().unwrap_or(pkce::PKCE_METHOD_S256);
        let challenge_ok = query
            .code_challenge
            .as_deref()
            .map(pkce::validate_code_challenge)
            .unwrap_or(false);
        if method != pkce::PKCE_METHOD_S256 || !challenge_ok {
            return Ok(AuthorizeOutcome::RedirectWithError {
                redirect_uri: query.redirect_uri,
                error: "invalid_request",
                state: query.state,
            });
        }
        let code_challenge = query.code_challenge.expect("checked above");

        let scope = query.scope.unwrap_or_default();

        let idp_scopes = vec!["read:user".to_string(), "user:email".to_string()];
        let (idp_redirect, idp_state) = self.idp.authorize_url(&idp_scopes);

        let request_state = AuthorizationRequestState {
            client_id: query.client_id,
            redirect_uri: query.redirect_uri,
            scope,
            code_challenge,
            client_state: query.state,
            created_at: Utc::now(),
        };
        let ttl = std::time::Duration::from_secs(self.authz_state_ttl_secs.max(1) as u64);
        self.store
            .put(&keys::state(&idp_state), &request_state, Some(ttl))
            .await
            .map_err(|e| UntrustedFailure(format!("storage unavailable: {e}")))?;

        Ok(AuthorizeOutcome::RedirectToIdp(idp_redirect))
    }

    pub async fn callback(
        &self,
        http: &reqwest::Client,
        query: CallbackQuery,
    ) -> Result<CallbackOutcome, UntrustedFailure> {
        let Some(idp_state) = query.state else {
            return Err(UntrustedFailure("Missing state parameter.".to_string()));
        };

        let request_state = self
            .store
            .take_once::<AuthorizationRequestState>(&keys::state(&idp_state))
            .await
            .map_err(|e| UntrustedFailure(format!("storage unavailable: {e}")))?
            .ok_or_else(|| {
                UntrustedFailure("Your sign-in link expired; please try again.".to_string())
            })?;

        if query.error.is_some() {
            return Ok(CallbackOutcome::RedirectAccessDenied {
                redirect_uri: request_state.redirect_uri,
                state: request_state.client_state,
            });
        }

        let Some(idp_code) = query.code else {
            return Err(UntrustedFailure(
                "Identity provider did not return an authorization code.".to_string(),
            ));
        };

        let identity = match self.idp.exchange_code(http, &idp_code).await {
            Ok(identity) => identity,
            Err(IdpError::Transport(_)) => self
                .idp
                .exchange_code(http, &idp_code)
                .await
                .map_err(|e| UntrustedFailure(format!("identity provider error: {e}")))?,
            Err(e) => return Err(UntrustedFailure(format!("identity provider error: {e}"))),
        };

        if !self.policy.allows(&identity) {
            return Ok(CallbackOutcome::RedirectAccessDenied {
                redirect_uri: request_state.redirect_uri,
                state: request_state.client_state,
            });
        }

        let code = secret::generate_opaque_token(32);
        let authorization_code = AuthorizationCode {
            client_id: request_state.client_id,
            redirect_uri: request_state.redirect_uri.clone(),
            scope: request_state.scope,
            code_challenge: request_state.code_challenge,
            identity,
            issued_at: Utc::now(),
        };
        let ttl = std::time::Duration::from_secs(self.authorization_code_ttl_secs.max(1) as u64);
        self.store
            .put(&keys::code(&code), &authorization_code, Some(ttl))
            .await
            .map_err(|e| UntrustedFailure(format!("storage unavailable: {e}")))?;

        Ok(CallbackOutcome::RedirectWithCode {
            redirect_uri: request_state.redirect_uri,
            code,
            state: request_state.client_state,
        })
    }

    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_str() {
            "authorization_code" => self.token_authorization_code(request).await,
            "refresh_token" => self.token_refresh(request).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }

    async fn token_authorization_code(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".to_string()))?;
        let client_id = request
            .client_id
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
        let code_verifier = request
            .code_verifier
            .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".to_string()))?;

        // Consumed unconditionally: a failed redemption attempt must not
        // leave the code valid for a subsequent try (P1, anti-probing).
        let stored = self
            .store
            .take_once::<AuthorizationCode>(&keys::code(&code))
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| OAuthError::InvalidGrant("unknown or already-used code".to_string()))?;

        if stored.client_id != client_id || stored.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant(
                "code does not match client_id or redirect_uri".to_string(),
            ));
        }

        let client = self.authenticate_client(&client_id, request.client_secret.as_deref()).await?;

        if !self.tokens.verify_pkce(&code_verifier, &stored.code_challenge) {
            return Err(OAuthError::InvalidGrant("PKCE verification failed".to_string()));
        }

        let access = self
            .tokens
            .mint_access_token(&client_id, &stored.identity, &stored.scope)
            .await
            .map_err(token_error_to_oauth)?;

        let refresh_token = if client.supports_grant(GrantType::RefreshToken) {
            Some(
                self.tokens
                    .mint_refresh_token(&client_id, &stored.identity, &stored.scope)
                    .await
                    .map_err(token_error_to_oauth)?,
            )
        } else {
            None
        };

        Ok(TokenResponse {
            access_token: access.jwt,
            token_type: "Bearer",
            expires_in: access.expires_in,
            refresh_token,
            scope: stored.scope,
        })
    }

    async fn token_refresh(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let refresh_token = request
            .refresh_token
            .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;
        let client_id = request
            .client_id
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;

        self.authenticate_client(&client_id, request.client_secret.as_deref()).await?;

        let (access, record) = self
            .tokens
            .redeem_refresh_token(&refresh_token, &client_id)
            .await
            .map_err(token_error_to_oauth)?;

        Ok(TokenResponse {
            access_token: access.jwt,
            token_type: "Bearer",
            expires_in: access.expires_in,
            refresh_token: Some(refresh_token),
            scope: record.scope,
        })
    }

    pub async fn revoke(&self, request: RevokeRequest) -> Result<(), OAuthError> {
        let client_id = request
            .client_id
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
        self.authenticate_client(&client_id, request.client_secret.as_deref()).await?;

        // Always 200 regardless of whether the token was found (RFC 7009
        // §2.2) — errors below are swallowed deliberately.
        if let Ok((claims, record)) = self.tokens.verify_access_token(&request.token).await {
            if record.client_id == client_id {
                let _ = self.tokens.revoke_access_token(&claims.jti).await;
            }
            return Ok(());
        }
        let _ = self.tokens.revoke_refresh_token(&request.token).await;
        Ok(())
    }

    pub async fn introspect(&self, request: IntrospectRequest) -> Result<IntrospectResponse, OAuthError> {
        let client_id = request
            .client_id
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
        self.authenticate_client(&client_id, request.client_secret.as_deref()).await?;

        if let Ok((claims, record)) = self.tokens.verify_access_token(&request.token).await {
            return Ok(IntrospectResponse {
                active: true,
                sub: Some(claims.sub),
                client_id: Some(record.client_id),
                scope: Some(record.scope),
                exp: Some(claims.exp),
                iat: Some(claims.iat),
                jti: Some(claims.jti),
            });
        }

        Ok(IntrospectResponse::default())
    }

    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Client, OAuthError> {
        let client = self.clients.get(client_id).await.map_err(|_| OAuthError::InvalidClient)?;
        if client.is_expired(Utc::now()) {
            return Err(OAuthError::InvalidClient);
        }
        if !self.clients.authenticate_client_secret(&client, client_secret) {
            return Err(OAuthError::InvalidClient);
        }
        Ok(client)
    }
}

fn token_error_to_oauth(err: TokenError) -> OAuthError {
    match err {
        TokenError::Expired | TokenError::Invalid | TokenError::Revoked | TokenError::ClientMismatch => {
            OAuthError::InvalidGrant(err.to_string())
        }
        TokenError::Storage(e) => OAuthError::Server(e),
    }
}
