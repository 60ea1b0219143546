use axum::extract::Query;
use axum::http::{header, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

/// Minimal self-contained HTML, the same ad hoc `format!`-built approach
/// used elsewhere in this codebase's family for one-off HTML responses —
/// no template engine dependency for two static pages.
fn html_page(title: &str, body: &str) -> Response {
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family: sans-serif; max-width: 32rem; margin: 4rem auto;\">\
         <h1>{title}</h1><p>{body}</p></body></html>"
    );
    let mut response = Html(html).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

pub fn render_error_page(message: &str) -> Response {
    html_page("Sign-in error", message)
}

pub fn render_success_page() -> Response {
    html_page("Signed in", "You may close this window and return to your application.")
}

#[derive(Debug, Deserialize)]
pub struct ErrorPageQuery {
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn error_page(Query(query): Query<ErrorPageQuery>) -> Response {
    render_error_page(
        query
            .message
            .as_deref()
            .unwrap_or("Something went wrong during sign-in. Please try again."),
    )
}

pub async fn success_page() -> Response {
    render_success_page()
}
