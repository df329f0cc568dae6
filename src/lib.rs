pub mod api;
pub mod config;
pub mod services;

use crate::config::TicketConfig;
use crate::services::composer::TicketComposer;
use crate::services::sanitizer::UploadSanitizer;
use crate::services::store::TempStore;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::ticket::create_ticket,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "ticket", description = "Ticket composition endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TempStore>,
    pub sanitizer: Arc<UploadSanitizer>,
    pub composer: Arc<TicketComposer>,
    pub config: TicketConfig,
}

pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::form::ticket_form))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/ticket",
            post(api::handlers::ticket::create_ticket).layer(
                // Two image fields plus multipart overhead headroom.
                axum::extract::DefaultBodyLimit::max(state.config.max_upload_size * 2 + 1024 * 1024),
            ),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
