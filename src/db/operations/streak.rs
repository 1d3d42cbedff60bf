use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub total_study_days: i64,
}

pub async fn get_or_create_streak(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<StreakState, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "learning_streaks"
            ("userId", "currentStreak", "longestStreak", "totalStudyDays", "createdAt", "updatedAt")
        VALUES (?, 0, 0, 0, ?, ?)
        ON CONFLICT ("userId") DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(r#"SELECT * FROM "learning_streaks" WHERE "userId" = ?"#)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    map_streak(&row)
}

pub async fn save_streak(
    conn: &mut SqliteConnection,
    user_id: i64,
    state: &StreakState,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "learning_streaks"
        SET "currentStreak" = ?, "longestStreak" = ?, "lastActivityDate" = ?,
            "totalStudyDays" = ?, "updatedAt" = ?
        WHERE "userId" = ?
        "#,
    )
    .bind(state.current_streak)
    .bind(state.longest_streak)
    .bind(state.last_activity_date)
    .bind(state.total_study_days)
    .bind(now)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn map_streak(row: &SqliteRow) -> Result<StreakState, sqlx::Error> {
    Ok(StreakState {
        current_streak: row.try_get("currentStreak")?,
        longest_streak: row.try_get("longestStreak")?,
        last_activity_date: row.try_get("lastActivityDate")?,
        total_study_days: row.try_get("totalStudyDays")?,
    })
}
