use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub user_answer: String,
    pub is_correct: bool,
    #[serde(default, alias = "timeTaken")]
    pub time_taken_seconds: Option<i64>,
    #[serde(default)]
    pub confidence_level: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerReview {
    pub id: i64,
    pub wrong_answer_id: i64,
    pub user_answer: String,
    pub is_correct: bool,
    pub time_taken_seconds: Option<i64>,
    pub confidence_level: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_review(
    conn: &mut SqliteConnection,
    wrong_answer_id: i64,
    outcome: &ReviewOutcome,
    now: DateTime<Utc>,
) -> Result<WrongAnswerReview, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "wrong_answer_reviews"
            ("wrongAnswerId", "userAnswer", "isCorrect", "timeTakenSeconds", "confidenceLevel", "notes", "createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(wrong_answer_id)
    .bind(&outcome.user_answer)
    .bind(outcome.is_correct)
    .bind(outcome.time_taken_seconds)
    .bind(outcome.confidence_level)
    .bind(&outcome.notes)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    map_review(&row)
}

/// Correctness of the `limit` latest reviews of an item, newest first.
pub async fn recent_review_outcomes(
    conn: &mut SqliteConnection,
    wrong_answer_id: i64,
    limit: i64,
) -> Result<Vec<bool>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT "isCorrect" FROM "wrong_answer_reviews"
        WHERE "wrongAnswerId" = ?
        ORDER BY "createdAt" DESC, "id" DESC
        LIMIT ?
        "#,
    )
    .bind(wrong_answer_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

pub async fn list_reviews_for_item(
    conn: &mut SqliteConnection,
    wrong_answer_id: i64,
) -> Result<Vec<WrongAnswerReview>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "wrong_answer_reviews"
        WHERE "wrongAnswerId" = ?
        ORDER BY "createdAt" DESC, "id" DESC
        "#,
    )
    .bind(wrong_answer_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_review).collect()
}

pub async fn recent_reviews_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<WrongAnswerReview>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT r.* FROM "wrong_answer_reviews" r
        JOIN "wrong_answers" w ON w."id" = r."wrongAnswerId"
        WHERE w."userId" = ?
        ORDER BY r."createdAt" DESC, r."id" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_review).collect()
}

fn map_review(row: &SqliteRow) -> Result<WrongAnswerReview, sqlx::Error> {
    Ok(WrongAnswerReview {
        id: row.try_get("id")?,
        wrong_answer_id: row.try_get("wrongAnswerId")?,
        user_answer: row.try_get("userAnswer")?,
        is_correct: row.try_get("isCorrect")?,
        time_taken_seconds: row.try_get("timeTakenSeconds")?,
        confidence_level: row.try_get("confidenceLevel")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("createdAt")?,
    })
}
