//! HTTP server implementation for the API

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::jobs::CourseJobLauncher;

use super::handlers::{self, HandlerError};
use super::models::{ApiResponse, GenerateCourseRequest};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub launcher: CourseJobLauncher,
    pub config: Arc<Config>,
}

/// Routes and middleware, without binding a socket
pub fn router(launcher: CourseJobLauncher, config: Arc<Config>) -> Router {
    let cors = cors_layer(&config.server.cors_origins);
    let app_state = AppState { launcher, config };

    Router::new()
        .route("/", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/generate-course-path", post(generate_handler))
        .route("/api/v1/runs/:id", get(run_status_handler))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Configure and start the HTTP server
pub async fn start_http_server(launcher: CourseJobLauncher, config: Arc<Config>) -> Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let app = router(launcher, config);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("🌐 API server listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Empty origin list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

fn error_response(err: HandlerError) -> Response {
    let status = match err {
        HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
        HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::<()>::error(err.to_string()))).into_response()
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(handlers::health_check(&state.launcher).await)
}

/// Generation trigger; answers before the run does any work
async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<GenerateCourseRequest>,
) -> Response {
    match handlers::generate_course_path(&state.launcher, body).await {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Run status handler
async fn run_status_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match handlers::run_status(&state.launcher, &id).await {
        Ok(status) => (StatusCode::OK, Json(ApiResponse::success(status))).into_response(),
        Err(e) => error_response(e),
    }
}
