//! GET /api/results

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{models::ExpenseRecord, AppState};

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub results: Vec<ExpenseRecord>,
    pub count: usize,
}

/// Every record of the most recent batch
pub async fn current_results(State(state): State<AppState>) -> Json<ResultsResponse> {
    let results = state
        .current_batch
        .read()
        .await
        .as_ref()
        .map(|batch| batch.records.clone())
        .unwrap_or_default();

    Json(ResultsResponse {
        count: results.len(),
        results,
    })
}

pub fn results_routes() -> Router<AppState> {
    Router::new().route("/api/results", get(current_results))
}
