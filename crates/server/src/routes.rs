use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::Html,
    routing::{get, put},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
};
use tracing::Level;

use common::types::Health;
use service::catalog::CatalogService;

pub mod books;

/// Shared handler state. Holds no record data; every request goes to the stores.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn index() -> Html<&'static str> {
    Html("<p>Hello, World!</p>")
}

async fn metrics() -> (StatusCode, String) {
    match service::observability::encode_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Build the full application router
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    let catalog = Router::new()
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/:id", put(books::update_book).delete(books::delete_book));

    // Compose
    public
        .merge(catalog)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                // 每次请求创建 span，包含方法和路径等，日志级别为 INFO
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                // 响应返回时打点，包含状态码与耗时
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                // 失败（5xx 等）时以 ERROR 记录
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
