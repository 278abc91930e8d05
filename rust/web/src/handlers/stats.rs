//! Read-side statistics endpoints.

use crate::errors::IntoErrorResponse;
use crate::sink::{ResultRecord, ResultStore, SinkError};
use crate::stats;
use serde::Serialize;
use std::sync::Arc;
use warp::reply::{self, Response};
use warp::Reply;

async fn load<F>(store: Arc<dyn ResultStore>, read: F) -> Result<Vec<ResultRecord>, SinkError>
where
    F: FnOnce(&dyn ResultStore) -> Result<Vec<ResultRecord>, SinkError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || read(store.as_ref()))
        .await
        .map_err(|err| SinkError::Task(err.to_string()))?
}

fn with_cors(response: impl Reply) -> Response {
    reply::with_header(response, "Access-Control-Allow-Origin", "*").into_response()
}

fn respond<T, F>(loaded: Result<Vec<ResultRecord>, SinkError>, view: F) -> Response
where
    T: Serialize,
    F: FnOnce(&[ResultRecord]) -> T,
{
    match loaded {
        Ok(results) => with_cors(reply::json(&view(results.as_slice()))),
        Err(err) => with_cors(err.into_http_response()),
    }
}

pub async fn leaderboard(store: Arc<dyn ResultStore>) -> Response {
    respond(load(store, |s| s.results()).await, stats::leaderboard)
}

pub async fn efficiency(store: Arc<dyn ResultStore>) -> Response {
    respond(load(store, |s| s.results()).await, stats::efficiency)
}

pub async fn totals(store: Arc<dyn ResultStore>) -> Response {
    respond(load(store, |s| s.results()).await, stats::totals)
}

/// Only the newest rows are read; the store does the ordering.
pub async fn recent_results(store: Arc<dyn ResultStore>) -> Response {
    let loaded = load(store, |s| s.recent(stats::ROW_LIMIT)).await;
    respond(loaded, stats::recent)
}
