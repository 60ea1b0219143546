use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Config;
use crate::dto::registration::ClientRegistrationRequest;
use crate::error::RegistrationError;
use crate::models::client::{Client, GrantType, TokenEndpointAuthMethod};
use crate::services::token::TokenService;
use crate::store::{keys, Store};
use crate::utils::secret;

pub struct CreatedClient {
    pub client: Client,
    pub registration_token: String,
    pub client_secret: Option<String>,
}

/// RFC 7591 create, RFC 7592 read/update/delete. Stateless with respect to
/// `AuthorizationEngine`; all state travels through `Store`.
pub struct ClientRegistry {
    store: Store,
    issuer: String,
    client_lifetime_secs: i64,
}

impl ClientRegistry {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            issuer: config.issuer_url.clone(),
            client_lifetime_secs: config.client_lifetime_secs,
        }
    }

    pub async fn create(
        &self,
        request: ClientRegistrationRequest,
        token_service: &TokenService,
    ) -> Result<CreatedClient, RegistrationError> {
        let (grant_types, response_types, auth_method) = validate_metadata(&request)?;

        let client_id = secret::generate_client_id();
        let client_secret = match auth_method {
            TokenEndpointAuthMethod::None => None,
            _ => Some(secret::generate_client_secret()),
        };
        let client_secret_hash = client_secret.as_deref().map(secret::hash_opaque_token);

        let (registration_token, registration_token_hash) =
            token_service.generate_registration_token();
        let issued_at = Utc::now();
        let expires_at = (self.client_lifetime_secs > 0)
            .then(|| issued_at + chrono::Duration::seconds(self.client_lifetime_secs));

        let client = Client {
            id: Uuid::new_v4(),
            client_id: client_id.clone(),
            client_secret_hash,
            client_name: request
                .client_name
                .unwrap_or_else(|| "Unnamed client".to_string()),
            redirect_uris: request.redirect_uris,
            grant_types,
            response_types,
            token_endpoint_auth_method: auth_method,
            scope: request.scope.unwrap_or_default(),
            registration_access_token_hash: registration_token_hash,
            registration_client_uri: format!("{}/register/{client_id}", self.issuer),
            issued_at,
            expires_at,
        };

        self.persist(&client).await?;

        Ok(CreatedClient {
            client,
            registration_token,
            client_secret,
        })
    }

    pub async fn get(&self, client_id: &str) -> Result<Client, RegistrationError> {
        let client = self
            .store
            .get::<Client>(&keys::client(client_id))
            .await
            .map_err(anyhow::Error::from)?
            .ok_or(RegistrationError::NotFound)?;
        if client.is_expired(Utc::now()) {
            self.store
                .delete(&keys::client(client_id))
                .await
                .map_err(anyhow::Error::from)?;
            return Err(RegistrationError::NotFound);
        }
        Ok(client)
    }

    /// Fetches the client and checks the presented registration token
    /// against its stored hash in constant time. Used to authorize RFC 7592
    /// GET/PUT/DELETE (P4: a token scoped to client A must never authorize
    /// management of client B).
    pub async fn authenticate_registration(
        &self,
        client_id: &str,
        presented_token: &str,
        token_service: &TokenService,
    ) -> Result<Client, RegistrationError> {
        let client = self.get(client_id).await?;
        if !token_service
            .verify_registration_token(presented_token, &client.registration_access_token_hash)
        {
            return Err(RegistrationError::InvalidToken);
        }
        Ok(client)
    }

    pub async fn update(
        &self,
        client_id: &str,
        presented_token: &str,
        request: ClientRegistrationRequest,
        token_service: &TokenService,
    ) -> Result<Client, RegistrationError> {
        let existing = self
            .authenticate_registration(client_id, presented_token, token_service)
            .await?;
        let (grant_types, response_types, auth_method) = validate_metadata(&request)?;

        // A secret-bearing auth method needs an existing secret to carry
        // forward: minting a fresh one here would hash-and-store it without
        // any way to hand the plaintext back to the caller. Switching a
        // public client to a confidential auth method requires registering
        // a new client instead.
        let client_secret_hash = match auth_method {
            TokenEndpointAuthMethod::None => None,
            _ => match existing.client_secret_hash {
                Some(hash) => Some(hash),
                None => {
                    return Err(RegistrationError::InvalidClientMetadata(
                        "cannot switch to a secret-based auth method without an existing client_secret"
                            .to_string(),
                    ))
                }
            },
        };

        let client = Client {
            id: existing.id,
            client_id: client_id.to_string(),
            client_secret_hash,
            client_name: request
                .client_name
                .unwrap_or(existing.client_name),
            redirect_uris: request.redirect_uris,
            grant_types,
            response_types,
            token_endpoint_auth_method: auth_method,
            scope: request.scope.unwrap_or(existing.scope),
            registration_access_token_hash: existing.registration_access_token_hash,
            registration_client_uri: existing.registration_client_uri,
            issued_at: existing.issued_at,
            expires_at: existing.expires_at,
        };
        self.persist(&client).await?;
        Ok(client)
    }

    pub async fn delete(
        &self,
        client_id: &str,
        presented_token: &str,
        token_service: &TokenService,
    ) -> Result<(), RegistrationError> {
        self.authenticate_registration(client_id, presented_token, token_service)
            .await?;
        self.store
            .delete(&keys::client(client_id))
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Client authentication at `/token`, `/revoke`, `/introspect` per the
    /// client's declared `token_endpoint_auth_method`.
    pub fn authenticate_client_secret(&self, client: &Client, presented_secret: Option<&str>) -> bool {
        match (&client.client_secret_hash, presented_secret) {
            (None, _) => true,
            (Some(hash), Some(presented)) => secret::verify_opaque_token(presented, hash),
            (Some(_), None) => false,
        }
    }

    async fn persist(&self, client: &Client) -> Result<(), RegistrationError> {
        let ttl = (self.client_lifetime_secs > 0)
            .then(|| Duration::from_secs(self.client_lifetime_secs as u64));
        self.store
            .put(&keys::client(&client.client_id), client, ttl)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

fn validate_metadata(
    request: &ClientRegistrationRequest,
) -> Result<(Vec<GrantType>, Vec<String>, TokenEndpointAuthMethod), RegistrationError> {
    if request.redirect_uris.is_empty() {
        return Err(RegistrationError::InvalidClientMetadata(
            "redirect_uris must contain at least one URI".to_string(),
        ));
    }
    for uri in &request.redirect_uris {
        validate_redirect_uri(uri)?;
    }

    let grant_types = request
        .grant_types
        .iter()
        .map(|g| match g.as_str() {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(RegistrationError::InvalidClientMetadata(format!(
                "unsupported grant_type: {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if grant_types.is_empty() {
        return Err(RegistrationError::InvalidClientMetadata(
            "grant_types must not be empty".to_string(),
        ));
    }

    if request.response_types != ["code"] {
        return Err(RegistrationError::InvalidClientMetadata(
            "response_types must be exactly [\"code\"]".to_string(),
        ));
    }

    let auth_method = match request.token_endpoint_auth_method.as_str() {
        "none" => TokenEndpointAuthMethod::None,
        "client_secret_post" => TokenEndpointAuthMethod::ClientSecretPost,
        "client_secret_basic" => TokenEndpointAuthMethod::ClientSecretBasic,
        other => {
            return Err(RegistrationError::InvalidClientMetadata(format!(
                "unsupported token_endpoint_auth_method: {other}"
            )))
        }
    };

    Ok((grant_types, request.response_types.clone(), auth_method))
}

/// Every redirect URI must be absolute and `https`, unless the host is
/// exactly `localhost` or `127.0.0.1` (loopback exception for local
/// development clients).
fn validate_redirect_uri(uri: &str) -> Result<(), RegistrationError> {
    let parsed = url::Url::parse(uri)
        .map_err(|_| RegistrationError::InvalidRedirectUri(format!("not an absolute URI: {uri}")))?;
    let host = parsed.host_str().unwrap_or_default();
    let is_loopback = host == "localhost" || host == "127.0.0.1";
    if parsed.scheme() != "https" && !is_loopback {
        return Err(RegistrationError::InvalidRedirectUri(format!(
            "{uri} must use https unless host is localhost or 127.0.0.1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> ClientRegistrationRequest {
        ClientRegistrationRequest {
            redirect_uris: vec!["https://app.example.test/cb".to_string()],
            client_name: Some("Example".to_string()),
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            scope: None,
        }
    }

    #[test]
    fn accepts_valid_https_redirect_uri() {
        assert!(validate_metadata(&base_request()).is_ok());
    }

    #[test]
    fn accepts_loopback_http_redirect_uri() {
        let mut request = base_request();
        request.redirect_uris = vec!["http://127.0.0.1:4000/cb".to_string()];
        assert!(validate_metadata(&request).is_ok());
    }

    #[test]
    fn rejects_non_https_non_loopback_redirect_uri() {
        let mut request = base_request();
        request.redirect_uris = vec!["http://app.example.test/cb".to_string()];
        assert!(matches!(
            validate_metadata(&request),
            Err(RegistrationError::InvalidRedirectUri(_))
        ));
    }

    #[test]
    fn rejects_unknown_grant_type() {
        let mut request = base_request();
        request.grant_types = vec!["implicit".to_string()];
        assert!(matches!(
            validate_metadata(&request),
            Err(RegistrationError::InvalidClientMetadata(_))
        ));
    }

    #[test]
    fn rejects_non_code_response_type() {
        let mut request = base_request();
        request.response_types = vec!["token".to_string()];
        assert!(matches!(
            validate_metadata(&request),
            Err(RegistrationError::InvalidClientMetadata(_))
        ));
    }
}
