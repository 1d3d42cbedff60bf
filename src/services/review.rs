use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::operations::review::{self, ReviewOutcome, WrongAnswerReview};
use crate::db::operations::wrong_answer::{self, WrongAnswer};
use crate::services::ServiceError;

/// Consecutive correct reviews, the submitted one included, that master an item.
pub const MASTERY_RUN: usize = 3;
pub const DEFAULT_RECOMMENDATION_LIMIT: i64 = 10;
pub const MAX_RECOMMENDATION_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryDecision {
    Master,
    Unmaster,
    Unchanged,
}

/// Decides the mastery flag from the submitted outcome and earlier outcomes,
/// newest first.
pub fn evaluate_mastery(is_correct: bool, prior_newest_first: &[bool]) -> MasteryDecision {
    if !is_correct {
        return MasteryDecision::Unmaster;
    }

    let needed = MASTERY_RUN - 1;
    if prior_newest_first.len() >= needed && prior_newest_first[..needed].iter().all(|c| *c) {
        MasteryDecision::Master
    } else {
        MasteryDecision::Unchanged
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub review: WrongAnswerReview,
    pub item: WrongAnswer,
    pub decision: MasteryDecision,
}

pub async fn submit_review(
    conn: &mut SqliteConnection,
    user_id: i64,
    item_id: i64,
    outcome: &ReviewOutcome,
    now: DateTime<Utc>,
) -> Result<ReviewResult, ServiceError> {
    if let Some(level) = outcome.confidence_level {
        if !(1..=5).contains(&level) {
            return Err(ServiceError::validation("confidenceLevel must be between 1 and 5"));
        }
    }
    if outcome.time_taken_seconds.is_some_and(|t| t < 0) {
        return Err(ServiceError::validation("timeTakenSeconds must not be negative"));
    }

    let item = wrong_answer::get_wrong_answer(conn, user_id, item_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Wrong answer not found"))?;

    let prior = review::recent_review_outcomes(conn, item.id, (MASTERY_RUN - 1) as i64).await?;
    let decision = evaluate_mastery(outcome.is_correct, &prior);

    let review = review::insert_review(conn, item.id, outcome, now).await?;

    let (mastered, mastered_at) = match decision {
        MasteryDecision::Master => (true, Some(now)),
        MasteryDecision::Unmaster => (false, None),
        MasteryDecision::Unchanged => (item.mastered, item.mastered_at),
    };
    let item = wrong_answer::update_review_state(conn, item.id, mastered, mastered_at, now).await?;

    tracing::debug!(
        user_id,
        item_id,
        is_correct = outcome.is_correct,
        ?decision,
        review_count = item.review_count,
        "review recorded"
    );

    Ok(ReviewResult {
        review,
        item,
        decision,
    })
}

pub async fn review_history(
    conn: &mut SqliteConnection,
    user_id: i64,
    item_id: i64,
) -> Result<Vec<WrongAnswerReview>, ServiceError> {
    if wrong_answer::get_wrong_answer(conn, user_id, item_id)
        .await?
        .is_none()
    {
        return Err(ServiceError::not_found("Wrong answer not found"));
    }

    Ok(review::list_reviews_for_item(conn, item_id).await?)
}

/// Un-mastered items in review order, at most `limit` (default 10).
pub async fn recommend(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: Option<i64>,
) -> Result<Vec<WrongAnswer>, ServiceError> {
    let limit = limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
    if !(1..=MAX_RECOMMENDATION_LIMIT).contains(&limit) {
        return Err(ServiceError::validation(format!(
            "limit must be between 1 and {MAX_RECOMMENDATION_LIMIT}"
        )));
    }

    Ok(wrong_answer::list_review_candidates(conn, user_id, limit).await?)
}
