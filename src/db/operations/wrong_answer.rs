use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

pub const DEFAULT_SOURCE_TYPE: &str = "daily_test";
pub const DEFAULT_DIFFICULTY: f64 = 3.0;
pub const DEFAULT_POINTS: i64 = 3;

fn default_source_type() -> String {
    DEFAULT_SOURCE_TYPE.to_string()
}

fn default_difficulty() -> f64 {
    DEFAULT_DIFFICULTY
}

fn default_points() -> i64 {
    DEFAULT_POINTS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWrongAnswer {
    pub question_id: i64,
    pub question_content: String,
    pub user_answer: String,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default = "default_points")]
    pub points: i64,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub source_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswer {
    pub id: i64,
    pub question_id: i64,
    pub question_content: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub unit: Option<String>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub difficulty: f64,
    pub points: i64,
    pub source_type: String,
    pub source_id: Option<i64>,
    pub review_count: i64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub mastered: bool,
    pub mastered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Already-validated filter; every `Some` narrows the result.
#[derive(Debug, Clone, Default)]
pub struct WrongAnswerQuery {
    pub subject: Option<String>,
    pub unit: Option<String>,
    pub difficulty_min: Option<f64>,
    pub difficulty_max: Option<f64>,
    pub mastered: Option<bool>,
    pub source_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumn {
    Subject,
    Unit,
}

impl GroupColumn {
    const fn column(self) -> &'static str {
        match self {
            GroupColumn::Subject => "subject",
            GroupColumn::Unit => "unit",
        }
    }
}

/// Inserts the item, or on a `(userId, questionId, sourceType)` clash refreshes
/// only `userAnswer` and `updatedAt` of the stored row.
pub async fn upsert_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    item: &NewWrongAnswer,
    now: DateTime<Utc>,
) -> Result<WrongAnswer, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "wrong_answers" (
            "userId", "questionId", "questionContent", "userAnswer", "correctAnswer",
            "explanation", "unit", "subject", "topic", "difficulty", "points",
            "sourceType", "sourceId", "reviewCount", "mastered", "createdAt", "updatedAt"
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
        ON CONFLICT ("userId", "questionId", "sourceType") DO UPDATE SET
            "userAnswer" = excluded."userAnswer",
            "updatedAt" = excluded."updatedAt"
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(item.question_id)
    .bind(&item.question_content)
    .bind(&item.user_answer)
    .bind(&item.correct_answer)
    .bind(&item.explanation)
    .bind(&item.unit)
    .bind(&item.subject)
    .bind(&item.topic)
    .bind(item.difficulty)
    .bind(item.points)
    .bind(&item.source_type)
    .bind(item.source_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    map_wrong_answer(&row)
}

pub async fn get_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<Option<WrongAnswer>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "wrong_answers" WHERE "id" = ? AND "userId" = ?"#)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_wrong_answer).transpose()
}

pub async fn query_wrong_answers(
    conn: &mut SqliteConnection,
    user_id: i64,
    query: &WrongAnswerQuery,
) -> Result<Vec<WrongAnswer>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(r#"SELECT * FROM "wrong_answers" WHERE "userId" = "#);
    builder.push_bind(user_id);

    if let Some(subject) = &query.subject {
        builder.push(r#" AND "subject" = "#).push_bind(subject.clone());
    }
    if let Some(unit) = &query.unit {
        builder.push(r#" AND "unit" = "#).push_bind(unit.clone());
    }
    if let Some(min) = query.difficulty_min {
        builder.push(r#" AND "difficulty" >= "#).push_bind(min);
    }
    if let Some(max) = query.difficulty_max {
        builder.push(r#" AND "difficulty" <= "#).push_bind(max);
    }
    if let Some(mastered) = query.mastered {
        builder.push(r#" AND "mastered" = "#).push_bind(mastered);
    }
    if let Some(source_type) = &query.source_type {
        builder.push(r#" AND "sourceType" = "#).push_bind(source_type.clone());
    }

    builder
        .push(r#" ORDER BY "createdAt" DESC, "id" DESC LIMIT "#)
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);

    let rows = builder.build().fetch_all(&mut *conn).await?;
    rows.iter().map(map_wrong_answer).collect()
}

/// Deletes the item and its review history. `false` when the user does not own `id`.
pub async fn delete_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM "wrong_answer_reviews"
        WHERE "wrongAnswerId" IN (SELECT "id" FROM "wrong_answers" WHERE "id" = ? AND "userId" = ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query(r#"DELETE FROM "wrong_answers" WHERE "id" = ? AND "userId" = ?"#)
        .bind(id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_review_state(
    conn: &mut SqliteConnection,
    id: i64,
    mastered: bool,
    mastered_at: Option<DateTime<Utc>>,
    reviewed_at: DateTime<Utc>,
) -> Result<WrongAnswer, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE "wrong_answers"
        SET "reviewCount" = "reviewCount" + 1, "lastReviewedAt" = ?,
            "mastered" = ?, "masteredAt" = ?, "updatedAt" = ?
        WHERE "id" = ?
        RETURNING *
        "#,
    )
    .bind(reviewed_at)
    .bind(mastered)
    .bind(mastered_at)
    .bind(reviewed_at)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    map_wrong_answer(&row)
}

/// Un-mastered items: never reviewed first, then stalest review, harder, more reviewed.
pub async fn list_review_candidates(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<WrongAnswer>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "wrong_answers"
        WHERE "userId" = ? AND "mastered" = 0
        ORDER BY "lastReviewedAt" IS NOT NULL, "lastReviewedAt" ASC,
                 "difficulty" DESC, "reviewCount" DESC, "id" ASC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_wrong_answer).collect()
}

pub async fn count_wrong_answers(
    conn: &mut SqliteConnection,
    user_id: i64,
    mastered: Option<bool>,
) -> Result<i64, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(r#"SELECT COUNT(*) FROM "wrong_answers" WHERE "userId" = "#);
    builder.push_bind(user_id);
    if let Some(mastered) = mastered {
        builder.push(r#" AND "mastered" = "#).push_bind(mastered);
    }

    builder.build_query_scalar::<i64>().fetch_one(&mut *conn).await
}

pub async fn count_review_needed(
    conn: &mut SqliteConnection,
    user_id: i64,
    reviewed_before: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "wrong_answers"
        WHERE "userId" = ? AND "mastered" = 0
          AND ("lastReviewedAt" IS NULL OR "lastReviewedAt" < ?)
        "#,
    )
    .bind(user_id)
    .bind(reviewed_before)
    .fetch_one(&mut *conn)
    .await
}

/// `(label, count)` pairs; a NULL label comes back as `None`.
pub async fn count_grouped_by(
    conn: &mut SqliteConnection,
    user_id: i64,
    column: GroupColumn,
) -> Result<Vec<(Option<String>, i64)>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT "{col}" AS "label", COUNT(*) AS "count" FROM "wrong_answers"
        WHERE "userId" = ?
        GROUP BY "{col}"
        "#,
        col = column.column()
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("label")?, row.try_get("count")?)))
        .collect()
}

/// Counts items with `min <= difficulty < max` (or `<= max` when `inclusive_max`).
pub async fn count_in_difficulty_range(
    conn: &mut SqliteConnection,
    user_id: i64,
    min: f64,
    max: f64,
    inclusive_max: bool,
) -> Result<i64, sqlx::Error> {
    let upper = if inclusive_max { "<=" } else { "<" };
    let sql = format!(
        r#"
        SELECT COUNT(*) FROM "wrong_answers"
        WHERE "userId" = ? AND "difficulty" >= ? AND "difficulty" {upper} ?
        "#
    );
    sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(min)
        .bind(max)
        .fetch_one(&mut *conn)
        .await
}

fn map_wrong_answer(row: &SqliteRow) -> Result<WrongAnswer, sqlx::Error> {
    Ok(WrongAnswer {
        id: row.try_get("id")?,
        question_id: row.try_get("questionId")?,
        question_content: row.try_get("questionContent")?,
        user_answer: row.try_get("userAnswer")?,
        correct_answer: row.try_get("correctAnswer")?,
        explanation: row.try_get("explanation")?,
        unit: row.try_get("unit")?,
        subject: row.try_get("subject")?,
        topic: row.try_get("topic")?,
        difficulty: row.try_get("difficulty")?,
        points: row.try_get("points")?,
        source_type: row.try_get("sourceType")?,
        source_id: row.try_get("sourceId")?,
        review_count: row.try_get("reviewCount")?,
        last_reviewed_at: row.try_get("lastReviewedAt")?,
        mastered: row.try_get("mastered")?,
        mastered_at: row.try_get("masteredAt")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
