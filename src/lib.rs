//! Returns API Library
//!
//! Return request intake, status lookup and admin review for e-commerce
//! storefronts.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, SharedIdentityProvider};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::repositories::{Page, SharedReturnStore};

/// Largest request body accepted by any route.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: handlers::AppServices,
    pub identity: SharedIdentityProvider,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: SharedReturnStore,
        event_sender: EventSender,
        identity: SharedIdentityProvider,
    ) -> Self {
        let services = handlers::AppServices::new(store, event_sender, config.return_policy());
        Self {
            config: Arc::new(config),
            services,
            identity,
            started_at: Instant::now(),
        }
    }

    pub fn return_service(&self) -> Arc<services::ReturnService> {
        self.services.returns.clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Offset-based page of results.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    /// Absent when the whole remainder was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl<T> From<Page<T>> for PaginatedResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes served under `/api/v1`. Admin routes require `admin_role`.
pub fn api_v1_routes(admin_role: &str) -> Router<AppState> {
    let public = Router::new()
        .route("/returns", post(handlers::returns::create_return))
        .route("/returns/status", get(handlers::returns::get_return_status));

    let admin = Router::new()
        .route("/returns", get(handlers::admin_returns::list_returns))
        .route("/returns/{id}", get(handlers::admin_returns::get_return))
        .route(
            "/returns/{id}/history",
            get(handlers::admin_returns::get_return_history),
        )
        .route(
            "/returns/{id}/status",
            post(handlers::admin_returns::update_return_status),
        )
        .with_role(admin_role);

    Router::new()
        .route("/status", get(api_status))
        .merge(public)
        .nest("/admin", admin)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "environment": state.config.environment,
        "store_backend": state.return_service().storage_backend(),
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn root() -> &'static str {
    "returns-api up"
}

/// Full application router with state applied. CORS is left to the caller.
pub fn app_router(state: AppState) -> Router {
    let admin_role = state.config.admin_role.clone();
    let identity = state.identity.clone();

    Router::new()
        .route("/", get(root))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .merge(health::health_routes())
        .nest("/api/v1", api_v1_routes(&admin_role))
        .layer(Extension(identity))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(crate::tracing::configure_http_tracing())
        // Outermost so the trace span and every handler see the request id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn paginated_response_keeps_page_window() {
        let page = Page {
            items: vec![1, 2],
            total: 7,
            offset: 4,
            limit: Some(2),
        };
        let response = PaginatedResponse::from(page);
        assert_eq!(response.items, vec![1, 2]);
        assert_eq!(response.total, 7);
        assert_eq!(response.offset, 4);
        assert_eq!(response.limit, Some(2));
    }
}
