use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use common::types::Message;
use service::catalog::{Book, BookInput, BookPatch};
use tracing::info;

use crate::errors::JsonApiError;
use crate::routes::AppState;

fn invalid_body(rejection: JsonRejection) -> JsonApiError {
    JsonApiError::new(StatusCode::BAD_REQUEST, "Validation Error", Some(rejection.body_text()))
}

/// List every book. Query parameters are accepted and ignored.
pub async fn list_books(State(state): State<AppState>) -> Json<Vec<Book>> {
    let books = state.catalog.list().await;
    info!(count = books.len(), "list books");
    Json(books)
}

/// Create a book from `{title, rating}`; responds 201 with the stored record.
pub async fn create_book(
    State(state): State<AppState>,
    body: Result<Json<BookInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), JsonApiError> {
    let Json(input) = body.map_err(invalid_body)?;
    let book = state.catalog.create(input).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Partially update a book; omitted fields keep their values.
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<BookPatch>, JsonRejection>,
) -> Result<Json<Book>, JsonApiError> {
    let patch = match body {
        Ok(Json(patch)) => patch,
        // 缺少请求体时按空补丁处理，由服务层统一返回校验错误
        Err(JsonRejection::MissingJsonContentType(_)) => BookPatch::default(),
        Err(other) => return Err(invalid_body(other)),
    };
    let book = state.catalog.update(id, patch).await?;
    Ok(Json(book))
}

/// Delete a book from both stores.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Message>, JsonApiError> {
    state.catalog.delete(id).await?;
    Ok(Json(Message::new("Book deleted")))
}
