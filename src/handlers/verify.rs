use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::AppState;
use crate::error::VerifyError;
use crate::services::token::TokenError;

/// `/verify`: the forward-auth fast path. Accepts any HTTP method. Work is
/// dominated by signature verification plus one Store point-lookup — no
/// IdP or client-registry calls are on this path.
pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match verify_inner(&state, &headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(&state.config.issuer_url),
    }
}

async fn verify_inner(state: &AppState, headers: &HeaderMap) -> Result<Response, VerifyError> {
    let token = extract_bearer(headers).ok_or(VerifyError::MissingOrMalformed)?;

    let (claims, _record) = state
        .tokens
        .verify_access_token(token)
        .await
        .map_err(|err| match err {
            TokenError::Expired | TokenError::Invalid | TokenError::Revoked => {
                VerifyError::InvalidToken
            }
            TokenError::ClientMismatch => VerifyError::InvalidToken,
            TokenError::Storage(e) => VerifyError::Server(e),
        })?;

    let mut response = StatusCode::OK.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        "X-User-Id",
        HeaderValue::from_str(&claims.sub).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    let display_name = claims.name.clone().unwrap_or_else(|| claims.login.clone());
    response_headers.insert(
        "X-User-Name",
        HeaderValue::from_str(&display_name).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response_headers.insert(
        "X-Token-Id",
        HeaderValue::from_str(&claims.jti).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    Ok(response)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
