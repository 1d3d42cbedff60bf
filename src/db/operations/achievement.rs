use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: i64,
    pub achievement_type: String,
    pub achievement_key: String,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewAchievement<'a> {
    pub achievement_type: &'a str,
    pub achievement_key: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub icon: &'a str,
    pub color: &'a str,
}

pub async fn existing_achievement_keys(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<HashSet<String>, sqlx::Error> {
    let keys: Vec<String> =
        sqlx::query_scalar(r#"SELECT "achievementKey" FROM "achievements" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(keys.into_iter().collect())
}

/// Returns `None` when the user already holds `achievement_key`.
pub async fn insert_achievement(
    conn: &mut SqliteConnection,
    user_id: i64,
    new: NewAchievement<'_>,
    earned_at: DateTime<Utc>,
) -> Result<Option<Achievement>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "achievements"
            ("userId", "achievementType", "achievementKey", "title", "description", "icon", "color", "earnedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("userId", "achievementKey") DO NOTHING
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(new.achievement_type)
    .bind(new.achievement_key)
    .bind(new.title)
    .bind(new.description)
    .bind(new.icon)
    .bind(new.color)
    .bind(earned_at)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_achievement).transpose()
}

/// Newest first; `limit` of `None` returns everything.
pub async fn list_achievements(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: Option<i64>,
) -> Result<Vec<Achievement>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "achievements"
        WHERE "userId" = ?
        ORDER BY "earnedAt" DESC, "id" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit.unwrap_or(-1))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_achievement).collect()
}

fn map_achievement(row: &SqliteRow) -> Result<Achievement, sqlx::Error> {
    Ok(Achievement {
        id: row.try_get("id")?,
        achievement_type: row.try_get("achievementType")?,
        achievement_key: row.try_get("achievementKey")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        color: row.try_get("color")?,
        earned_at: row.try_get("earnedAt")?,
    })
}
