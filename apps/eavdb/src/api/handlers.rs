//! # API Endpoint Handlers

use super::{
    AppState,
    types::{DatabaseResponse, DatabaseStatus, ErrorResponse, HealthResponse, StatusResponse},
};
use crate::responder::Message;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eavdb_core::{EavError, canonical_checksum};

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Evaluation state and per-database counts.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let responder = state.responder.read().await;
    let response = match responder.evaluation() {
        Some(evaluation) => StatusResponse {
            state: Some(evaluation.state()),
            round: evaluation.round(),
            databases: evaluation
                .databases()
                .iter()
                .map(|db| DatabaseStatus {
                    name: db.name().to_string(),
                    triples: db.len(),
                    blocks: db.blocks().len(),
                })
                .collect(),
        },
        None => StatusResponse {
            state: None,
            round: 0,
            databases: Vec::new(),
        },
    };
    (StatusCode::OK, Json(response))
}

/// Handle one protocol message and return its replies.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> impl IntoResponse {
    let mut responder = state.responder.write().await;
    let replies = responder.handle(message);
    (StatusCode::OK, Json(replies))
}

/// Dump one database of the running evaluation.
pub async fn database_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let responder = state.responder.read().await;
    let Some(evaluation) = responder.evaluation() else {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("no evaluation running")),
        )
            .into_response();
    };
    match evaluation.get_database(&name) {
        Ok(db) => (
            StatusCode::OK,
            Json(DatabaseResponse {
                name: db.name().to_string(),
                triples: db.index().triples().collect(),
                checksum: canonical_checksum(db),
            }),
        )
            .into_response(),
        Err(e @ EavError::DatabaseNotFound(_)) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new(e.to_string()))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}
