//! MCP Surface Routes

use super::handlers::{handle_mcp, health_check, service_status, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// MCP surface router
pub struct McpApi;

impl McpApi {
    /// Create the HTTP router for the MCP endpoint and status pages
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(service_status))
            .route("/health", get(health_check))
            .route("/mcp", post(handle_mcp))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EventBus;
    use crate::metrics::Metrics;
    use crate::subtitle::SubtitleService;
    use crate::ConnectionManager;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::SystemTime;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let config = Arc::new(Config::default());
        let events = EventBus::default();
        let metrics = Arc::new(Metrics::new());
        let manager = ConnectionManager::new(Arc::clone(&config), events.clone(), metrics.clone());

        AppState {
            config,
            link: manager.link(),
            service: Arc::new(SubtitleService::new(events, metrics.clone())),
            metrics,
            start_time: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = McpApi::create_router(create_test_state());

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = McpApi::create_router(create_test_state());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mcp_endpoint_rejects_get() {
        let app = McpApi::create_router(create_test_state());

        let request = Request::builder().uri("/mcp").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
