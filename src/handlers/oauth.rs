use axum::body::Bytes;
use base64::Engine as _;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};

use crate::config::AppState;
use crate::dto::oauth::{AuthorizeQuery, CallbackQuery, IntrospectRequest, RevokeRequest, TokenRequest};
use crate::error::OAuthError;
use crate::handlers::pages::render_error_page;
use crate::services::authorize::{AuthorizeOutcome, CallbackOutcome, UntrustedFailure};

/// `GET /authorize`.
pub async fn authorize(State(state): State<AppState>, Query(query): Query<AuthorizeQuery>) -> Response {
    match state.engine.authorize(query).await {
        Ok(AuthorizeOutcome::RedirectToIdp(url)) => Redirect::to(url.as_str()).into_response(),
        Ok(AuthorizeOutcome::RedirectWithError { redirect_uri, error, state }) => {
            let target = append_query(&redirect_uri, &[("error", Some(error)), ("state", state.as_deref())]);
            Redirect::to(&target).into_response()
        }
        Err(UntrustedFailure(message)) => render_error_page(&message),
    }
}

/// `GET /callback` — the external IdP returns here.
pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    match state.engine.callback(&state.http, query).await {
        Ok(CallbackOutcome::RedirectWithCode { redirect_uri, code, state }) => {
            let target = append_query(
                &redirect_uri,
                &[("code", Some(code.as_str())), ("state", state.as_deref())],
            );
            Redirect::to(&target).into_response()
        }
        Ok(CallbackOutcome::RedirectAccessDenied { redirect_uri, state }) => {
            let target = append_query(
                &redirect_uri,
                &[("error", Some("access_denied")), ("state", state.as_deref())],
            );
            Redirect::to(&target).into_response()
        }
        Err(UntrustedFailure(message)) => render_error_page(&message),
    }
}

/// `POST /token`. Accepts `application/x-www-form-urlencoded` (RFC 6749)
/// and JSON; client credentials may arrive via HTTP Basic, form fields, or
/// JSON fields.
pub async fn token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut request: TokenRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    apply_basic_auth(&headers, &mut request.client_id, &mut request.client_secret);

    match state.engine.token(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /revoke` (RFC 7009). Always 200 once the caller has authenticated.
pub async fn revoke(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut request: RevokeRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    apply_basic_auth(&headers, &mut request.client_id, &mut request.client_secret);

    match state.engine.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /introspect` (RFC 7662).
pub async fn introspect(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut request: IntrospectRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    apply_basic_auth(&headers, &mut request.client_id, &mut request.client_secret);

    match state.engine.introspect(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, OAuthError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/json") {
        serde_json::from_slice(body).map_err(|e| OAuthError::InvalidRequest(e.to_string()))
    } else {
        serde_urlencoded::from_bytes(body).map_err(|e| OAuthError::InvalidRequest(e.to_string()))
    }
}

/// Decodes `Authorization: Basic base64(client_id:client_secret)` and fills
/// in whichever of `client_id`/`client_secret` the body did not already
/// supply (RFC 6749 §2.3.1 `client_secret_basic`).
fn apply_basic_auth(headers: &HeaderMap, client_id: &mut Option<String>, client_secret: &mut Option<String>) {
    if client_id.is_some() && client_secret.is_some() {
        return;
    }
    let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return;
    };
    if let Some((id, secret)) = decoded.split_once(':') {
        client_id.get_or_insert_with(|| id.to_string());
        client_secret.get_or_insert_with(|| secret.to_string());
    }
}

fn append_query(base: &str, pairs: &[(&str, Option<&str>)]) -> String {
    match url::Url::parse(base) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in pairs {
                    if let Some(value) = value {
                        query.append_pair(key, value);
                    }
                }
            }
            url.to_string()
        }
        Err(_) => base.to_string(),
    }
}
