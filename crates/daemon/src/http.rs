use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use feedrank_core::model::{CycleReport, PopularPost, Post, TopUser};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{Scheduler, SchedulerState};
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<SnapshotStore>,
    scheduler: Scheduler,
}

impl AppState {
    pub fn new(store: Arc<SnapshotStore>, scheduler: Scheduler) -> Self {
        Self { store, scheduler }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/users", get(top_users))
        .route("/posts", get(posts))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn top_users(State(st): State<AppState>) -> Json<Vec<TopUser>> {
    Json(st.store.get().top_users.clone())
}

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Body of `GET /posts`, depending on `type`.
#[derive(Serialize)]
#[serde(untagged)]
enum PostsView {
    Latest(Vec<Post>),
    Popular(Vec<PopularPost>),
}

async fn posts(
    State(st): State<AppState>,
    Query(q): Query<PostsQuery>,
) -> Result<Json<PostsView>, ApiError> {
    let snapshot = st.store.get();
    match q.kind.as_deref() {
        Some("latest") => Ok(Json(PostsView::Latest(snapshot.latest_posts.clone()))),
        Some("popular") => Ok(Json(PostsView::Popular(snapshot.popular_posts.clone()))),
        Some(other) => Err(ApiError::InvalidParameter(format!(
            "invalid type {other:?}: expected \"latest\" or \"popular\""
        ))),
        None => Err(ApiError::InvalidParameter(
            "missing type: expected \"latest\" or \"popular\"".into(),
        )),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    refreshed_at_ms: Option<i64>,
    cycle: Option<CycleReport>,
    scheduler: SchedulerState,
}

async fn status(State(st): State<AppState>) -> Json<StatusResponse> {
    let published = st.store.published();
    let cycle = published.report.clone();
    Json(StatusResponse {
        refreshed_at_ms: cycle.as_ref().map(|c| c.finished_at_ms),
        cycle,
        scheduler: st.scheduler.state(),
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidParameter(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "rejecting request");
        let status = match self {
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}
