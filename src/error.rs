use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// RFC 6749 §5.2 / RFC 7591 §3.2.2 machine-readable error body shape.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

pub fn json_error(status: StatusCode, error: &'static str, description: Option<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            error_description: description,
            state: None,
        }),
    )
        .into_response()
}

/// One enum per RFC-facing concern, matching this codebase's existing
/// one-error-per-concern style. Covers `/authorize`, `/token`, `/revoke`,
/// `/introspect`.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid_client")]
    InvalidClient,
    #[error("{0}")]
    InvalidGrant(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("{0}")]
    InvalidScope(String),
    #[error("access_denied")]
    AccessDenied,
    #[error("invalid_token")]
    InvalidToken,
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl OAuthError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::InvalidToken => "invalid_token",
            OAuthError::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient | OAuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            OAuthError::AccessDenied => StatusCode::FORBIDDEN,
            OAuthError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let description = match &self {
            OAuthError::Server(err) => {
                tracing::error!(error = %err, "server_error");
                None
            }
            other => Some(other.to_string()),
        };
        let mut response = json_error(status, code, description);
        if matches!(self, OAuthError::InvalidClient | OAuthError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// RFC 7591/7592 client-registration errors.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidClientMetadata(String),
    #[error("{0}")]
    InvalidRedirectUri(String),
    #[error("invalid_token")]
    InvalidToken,
    #[error("client not found")]
    NotFound,
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        match self {
            RegistrationError::InvalidClientMetadata(msg) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_client_metadata", Some(msg))
            }
            RegistrationError::InvalidRedirectUri(msg) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_redirect_uri", Some(msg))
            }
            RegistrationError::InvalidToken => {
                let mut response = json_error(StatusCode::UNAUTHORIZED, "invalid_token", None);
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            RegistrationError::NotFound => StatusCode::NOT_FOUND.into_response(),
            RegistrationError::Server(err) => {
                tracing::error!(error = %err, "server_error");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", None)
            }
        }
    }
}

/// `/verify` errors. Built as an inherent method rather than `IntoResponse`
/// because the 401 response must carry the issuer-qualified
/// `resource_metadata` hint, which only the caller (holding `Config`) knows.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing or malformed Authorization header")]
    MissingOrMalformed,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl VerifyError {
    pub fn into_response(self, issuer: &str) -> Response {
        if let VerifyError::Server(err) = &self {
            tracing::error!(error = %err, "server_error");
        }
        let value = format!(
            "Bearer resource_metadata=\"{issuer}/.well-known/oauth-authorization-server\""
        );
        let header_value = HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.headers_mut().insert(header::WWW_AUTHENTICATE, header_value);
        response
    }
}
