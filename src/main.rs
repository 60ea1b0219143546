mod config;
mod dto;
mod error;
mod handlers;
mod models;
mod services;
mod store;
mod utils;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{AppState, Config};
use services::keys::KeyManager;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_auth_core=debug,tower_http=debug".into()),
        )
        .with(fmt::layer())
        .init();

    let config = Config::from_env()?;
    let store = Store::new(&config.redis_url)?;
    let keys = KeyManager::load(&config)?;
    let bind_addr = config.socket_addr();
    let state = AppState::new(config, store, keys)?;

    let app = create_router(state);

    tracing::info!(%bind_addr, "starting mcp-auth-core");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    let oauth_routes = Router::new()
        .route("/register", post(handlers::registration::create))
        .route(
            "/register/:client_id",
            get(handlers::registration::get)
                .put(handlers::registration::update)
                .delete(handlers::registration::delete),
        )
        .route("/authorize", get(handlers::oauth::authorize))
        .route("/callback", get(handlers::oauth::callback))
        .route("/token", post(handlers::oauth::token))
        .route("/revoke", post(handlers::oauth::revoke))
        .route("/introspect", post(handlers::oauth::introspect))
        .route("/verify", any(handlers::verify::verify))
        .route(
            "/.well-known/oauth-authorization-server",
            get(handlers::discovery::metadata),
        )
        .route("/jwks", get(handlers::discovery::jwks))
        .route("/error", get(handlers::pages::error_page))
        .route("/success", get(handlers::pages::success_page));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .merge(oauth_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

/// Liveness only — no backend calls, constant 200.
async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness — pings Store (Redis `PING`); 503 if unreachable.
async fn ready(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
