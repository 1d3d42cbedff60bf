use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::review::ReviewOutcome;
use crate::db::operations::wrong_answer::{NewWrongAnswer, WrongAnswer};
use crate::response::{ok, AppError};
use crate::services::wrong_answer::WrongAnswerFilter;
use crate::services::{review, wrong_answer};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_wrong_answers).post(add_wrong_answer))
        .route("/bulk", post(bulk_add))
        .route("/recommendations", get(recommendations))
        .route("/stats", get(stats))
        .route("/:id", get(get_wrong_answer).delete(delete_wrong_answer))
        .route("/:id/reviews", get(review_history).post(submit_review))
}

#[derive(Debug, Deserialize)]
struct BulkAddRequest {
    items: Vec<NewWrongAnswer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkAddData {
    requested_count: usize,
    stored_count: usize,
    items: Vec<WrongAnswer>,
}

#[derive(Debug, Serialize)]
struct DeletedData {
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn add_wrong_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(item): Json<NewWrongAnswer>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db_proxy().begin().await?;
    let stored = wrong_answer::add_wrong_answer(&mut tx, user.id, &item, Utc::now()).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, ok(stored)))
}

async fn bulk_add(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<BulkAddRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db_proxy().begin().await?;
    let items =
        wrong_answer::bulk_add_wrong_answers(&mut tx, user.id, &body.items, Utc::now()).await?;
    tx.commit().await?;

    tracing::info!(
        user_id = user.id,
        requested = body.items.len(),
        stored = items.len(),
        "bulk wrong answers stored"
    );

    Ok((
        StatusCode::CREATED,
        ok(BulkAddData {
            requested_count: body.items.len(),
            stored_count: items.len(),
            items,
        }),
    ))
}

async fn query_wrong_answers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<WrongAnswerFilter>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let items = wrong_answer::query_wrong_answers(&mut conn, user.id, filter).await?;

    Ok(ok(items))
}

async fn get_wrong_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let item = wrong_answer::get_wrong_answer(&mut conn, user.id, id).await?;

    Ok(ok(item))
}

async fn delete_wrong_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db_proxy().begin().await?;
    wrong_answer::delete_wrong_answer(&mut tx, user.id, id).await?;
    tx.commit().await?;

    Ok(ok(DeletedData { deleted: true }))
}

async fn submit_review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(outcome): Json<ReviewOutcome>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db_proxy().begin().await?;
    let result = review::submit_review(&mut tx, user.id, id, &outcome, Utc::now()).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, ok(result)))
}

async fn review_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let reviews = review::review_history(&mut conn, user.id, id).await?;

    Ok(ok(reviews))
}

async fn recommendations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let items = review::recommend(&mut conn, user.id, query.limit).await?;

    Ok(ok(items))
}

async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let stats = wrong_answer::wrong_answer_stats(&mut conn, user.id, Utc::now()).await?;

    Ok(ok(stats))
}
