use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::achievement::Achievement;
use crate::db::operations::activity::{ActivityDelta, DailyActivity};
use crate::db::operations::streak::StreakState;
use crate::response::{ok, AppError};
use crate::services::streak::{StreakTransition, DEFAULT_ACTIVITY_WINDOW_DAYS};
use crate::services::{achievement, streak};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_streak))
        .route("/activities", get(list_activities).post(record_activity))
        .route("/achievements", get(list_achievements))
        .route("/stats", get(learning_stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordActivityRequest {
    #[serde(default)]
    activity_date: Option<NaiveDate>,
    #[serde(flatten)]
    delta: ActivityDelta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordActivityData {
    activity: DailyActivity,
    streak: StreakState,
    transition: StreakTransition,
    new_achievements: Vec<Achievement>,
}

#[derive(Debug, Deserialize)]
struct ActivitiesQuery {
    days: Option<i64>,
}

async fn record_activity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RecordActivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let today = state.config().local_date(now);
    let date = body.activity_date.unwrap_or(today);
    if date > today {
        return Err(AppError::validation("activityDate must not be in the future"));
    }

    let mut tx = state.db_proxy().begin().await?;
    let recorded = streak::record_activity(&mut tx, user.id, date, &body.delta, now).await?;
    tx.commit().await?;

    // Achievements run in their own session once the activity is durable.
    let mut conn = state.db_proxy().acquire().await?;
    let new_achievements =
        match achievement::award_achievements(&mut conn, user.id, &recorded.streak, now).await {
            Ok(granted) => granted,
            Err(err) => {
                tracing::warn!(user_id = user.id, error = %err, "achievement evaluation failed");
                Vec::new()
            }
        };

    Ok((
        StatusCode::CREATED,
        ok(RecordActivityData {
            activity: recorded.activity,
            streak: recorded.streak,
            transition: recorded.transition,
            new_achievements,
        }),
    ))
}

async fn get_streak(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut tx = state.db_proxy().begin().await?;
    let view = streak::get_streak(&mut tx, user.id, state.config().local_date(now), now).await?;
    tx.commit().await?;

    Ok(ok(view))
}

async fn list_activities(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ActivitiesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = query.days.unwrap_or(DEFAULT_ACTIVITY_WINDOW_DAYS);
    let mut conn = state.db_proxy().acquire().await?;
    let activities =
        streak::list_activities(&mut conn, user.id, state.config().today(), days).await?;

    Ok(ok(activities))
}

async fn list_achievements(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db_proxy().acquire().await?;
    let achievements = achievement::list_achievements(&mut conn, user.id).await?;

    Ok(ok(achievements))
}

async fn learning_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut tx = state.db_proxy().begin().await?;
    let stats =
        streak::learning_stats(&mut tx, user.id, state.config().local_date(now), now).await?;
    tx.commit().await?;

    Ok(ok(stats))
}
