use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenResponse, TokenUrl};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
use crate::models::identity::UserIdentity;

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("transport error contacting identity provider: {0}")]
    Transport(String),
    #[error("identity provider returned an error or unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Drives GitHub's OAuth 2.0 authorization-code flow. GitHub's OAuth Apps
/// do not support PKCE on this leg, so none is attempted here — PKCE in
/// this system protects the leg between the MCP client and this server,
/// not the leg between this server and the IdP.
pub struct IdPClient {
    client: BasicClient,
    userinfo_url: String,
}

impl IdPClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.idp_client_id.clone()),
            Some(ClientSecret::new(config.idp_client_secret.clone())),
            AuthUrl::new(config.idp_authorize_url.clone())?,
            Some(TokenUrl::new(config.idp_token_url.clone())?),
        )
        .set_redirect_uri(RedirectUrl::new(format!("{}/callback", config.issuer_url))?);

        Ok(Self {
            client,
            userinfo_url: config.idp_userinfo_url.clone(),
        })
    }

    /// Returns the URL to redirect the user's browser to, and the CSRF
    /// `state` value the caller must pair with its own authorization
    /// request state in Store.
    pub fn authorize_url(&self, scopes: &[String]) -> (url::Url, String) {
        let mut builder = self.client.authorize_url(CsrfToken::new_random);
        for scope in scopes {
            builder = builder.add_scope(Scope::new(scope.clone()));
        }
        let (url, csrf_token) = builder.url();
        (url, csrf_token.secret().clone())
    }

    /// Exchanges the IdP's authorization code for an IdP access token, then
    /// resolves the user's identity. One immediate retry is attempted by
    /// the caller on `IdpError::Transport`; application-level errors are
    /// not retried.
    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<UserIdentity, IdpError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| IdpError::Transport(e.to_string()))?;

        self.fetch_identity(http, token.access_token().secret()).await
    }

    async fn fetch_identity(
        &self,
        http: &reqwest::Client,
        idp_access_token: &str,
    ) -> Result<UserIdentity, IdpError> {
        let profile: GitHubUser = http
            .get(&self.userinfo_url)
            .bearer_auth(idp_access_token)
            .send()
            .await
            .map_err(|e| IdpError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))?;

        let email = match profile.email {
            Some(email) => Some(email),
            None => self.fetch_primary_email(http, idp_access_token).await?,
        };

        Ok(UserIdentity {
            sub: profile.id.to_string(),
            login: profile.login,
            display_name: profile.name,
            email,
        })
    }

    /// GitHub omits `email` from `/user` when the user's primary email is
    /// private; the verified primary address is fetched from `/user/emails`
    /// instead.
    async fn fetch_primary_email(
        &self,
        http: &reqwest::Client,
        idp_access_token: &str,
    ) -> Result<Option<String>, IdpError> {
        let emails_url = format!("{}/emails", self.userinfo_url.trim_end_matches('/'));
        let emails: Vec<GitHubEmail> = http
            .get(&emails_url)
            .bearer_auth(idp_access_token)
            .send()
            .await
            .map_err(|e| IdpError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}
