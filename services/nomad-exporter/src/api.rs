//! HTTP routes: the scrape endpoint and a landing page.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::metrics::{encode_text, text_content_type, Collector};

#[derive(Clone)]
pub struct AppState {
    collector: Arc<dyn Collector>,
    metrics_path: Arc<str>,
}

/// Create the router serving `metrics_path` and the `/` landing page.
///
/// `metrics_path` must start with `/` and must not be `/` itself.
pub fn create_router(collector: Arc<dyn Collector>, metrics_path: &str) -> Router {
    let state = AppState {
        collector,
        metrics_path: Arc::from(metrics_path),
    };

    Router::new()
        .route("/", get(index))
        .route(metrics_path, get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>
             <head><title>Nomad Exporter</title></head>
             <body>
             <h1>Nomad Exporter</h1>
             <p><a href='{}'>Metrics</a></p>
             </body>
             </html>",
        state.metrics_path
    ))
}

/// Run one collection cycle and render it.
///
/// Collection failures only shrink the output; the response is still 200.
async fn metrics(State(state): State<AppState>) -> Response {
    let samples = state.collector.collect().await;

    match encode_text(&state.collector.describe(), &samples) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, text_content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
                .into_response()
        }
    }
}
