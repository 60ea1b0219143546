use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::config::AppState;
use crate::dto::registration::{ClientRegistrationRequest, ClientRegistrationResponse};
use crate::error::RegistrationError;
use crate::models::client::{Client, GrantType, TokenEndpointAuthMethod};

/// RFC 7591 bodies are JSON only. Parsed from raw bytes, rather than via the
/// `Json` extractor, so a malformed body yields the RFC-shaped
/// `invalid_client_metadata` error instead of Axum's default plain-text 400.
fn parse_registration_body(body: &[u8]) -> Result<ClientRegistrationRequest, RegistrationError> {
    serde_json::from_slice(body)
        .map_err(|e| RegistrationError::InvalidClientMetadata(e.to_string()))
}

fn auth_method_str(method: TokenEndpointAuthMethod) -> &'static str {
    match method {
        TokenEndpointAuthMethod::None => "none",
        TokenEndpointAuthMethod::ClientSecretPost => "client_secret_post",
        TokenEndpointAuthMethod::ClientSecretBasic => "client_secret_basic",
    }
}

fn grant_type_str(grant: GrantType) -> &'static str {
    match grant {
        GrantType::AuthorizationCode => "authorization_code",
        GrantType::RefreshToken => "refresh_token",
    }
}

fn to_response(client: &Client, registration_token: String, client_secret: Option<String>) -> ClientRegistrationResponse {
    ClientRegistrationResponse {
        client_id: client.client_id.clone(),
        client_secret,
        client_id_issued_at: client.issued_at.timestamp(),
        client_secret_expires_at: 0,
        client_name: client.client_name.clone(),
        redirect_uris: client.redirect_uris.clone(),
        grant_types: client.grant_types.iter().copied().map(grant_type_str).map(String::from).collect(),
        response_types: client.response_types.clone(),
        token_endpoint_auth_method: auth_method_str(client.token_endpoint_auth_method).to_string(),
        scope: client.scope.clone(),
        registration_access_token: registration_token,
        registration_client_uri: client.registration_client_uri.clone(),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, RegistrationError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RegistrationError::InvalidToken)?;
    let token = value.strip_prefix("Bearer ").ok_or(RegistrationError::InvalidToken)?.trim();
    if token.is_empty() {
        return Err(RegistrationError::InvalidToken);
    }
    Ok(token)
}

/// `POST /register` — RFC 7591 dynamic client registration. No auth.
pub async fn create(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_registration_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    match state.clients.create(request, &state.tokens).await {
        Ok(created) => {
            let body = to_response(&created.client, created.registration_token, created.client_secret);
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `GET /register/{client_id}` — RFC 7592 read.
pub async fn get(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_bearer(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    match state
        .clients
        .authenticate_registration(&client_id, token, &state.tokens)
        .await
    {
        Ok(client) => {
            let body = to_response(&client, token.to_string(), None);
            Json(body).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `PUT /register/{client_id}` — RFC 7592 update.
pub async fn update(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = match extract_bearer(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    let request = match parse_registration_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    match state
        .clients
        .update(&client_id, token, request, &state.tokens)
        .await
    {
        Ok(client) => {
            let body = to_response(&client, token.to_string(), None);
            Json(body).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `DELETE /register/{client_id}` — RFC 7592 delete.
pub async fn delete(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_bearer(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    match state.clients.delete(&client_id, token, &state.tokens).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
