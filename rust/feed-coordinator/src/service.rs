//! HTTP routes for the coordination service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::state::{Claim, CursorState};

/// Largest batch a single by-index request may claim.
pub const MAX_ROWS_PER_REQUEST: usize = 10_000;

/// Query string of a by-index request.
#[derive(Debug, Deserialize)]
pub struct ByIndexQuery {
    #[serde(default = "default_wrap")]
    pub wrap: bool,
    pub rows: usize,
    pub length: usize,
    pub key: Option<String>,
}

fn default_wrap() -> bool {
    true
}

/// Query string of an end-of-execution request.
#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

pub fn router(state: Arc<CursorState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rows/iterators/{iterator}/by-index", get(by_index))
        .route("/executions/{execution}", delete(end_execution))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn by_index(
    State(state): State<Arc<CursorState>>,
    Path(iterator): Path<String>,
    Query(query): Query<ByIndexQuery>,
) -> Response {
    if !state.authorize(query.key.as_deref()) {
        tracing::warn!(iterator = %iterator, "rejected request with bad key");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if query.rows == 0 || query.length == 0 {
        return (
            StatusCode::BAD_REQUEST,
            "rows and length must be greater than 0",
        )
            .into_response();
    }
    if query.rows > MAX_ROWS_PER_REQUEST {
        tracing::warn!(iterator = %iterator, rows = query.rows, "rejected oversized batch");
        return (
            StatusCode::BAD_REQUEST,
            format!("rows must not exceed {MAX_ROWS_PER_REQUEST}"),
        )
            .into_response();
    }

    match state
        .claim(&iterator, query.rows, query.length, query.wrap)
        .await
    {
        Claim::Granted(indices) => {
            tracing::debug!(
                iterator = %iterator,
                rows = query.rows,
                length = query.length,
                wrap = query.wrap,
                "granted rows"
            );
            Json(indices).into_response()
        }
        Claim::Exhausted => {
            tracing::debug!(iterator = %iterator, rows = query.rows, "iterator exhausted");
            StatusCode::RANGE_NOT_SATISFIABLE.into_response()
        }
    }
}

async fn end_execution(
    State(state): State<Arc<CursorState>>,
    Path(execution): Path<String>,
    Query(query): Query<KeyQuery>,
) -> StatusCode {
    if !state.authorize(query.key.as_deref()) {
        tracing::warn!(execution = %execution, "rejected request with bad key");
        return StatusCode::UNAUTHORIZED;
    }
    state.end_execution(&execution).await;
    StatusCode::NO_CONTENT
}
