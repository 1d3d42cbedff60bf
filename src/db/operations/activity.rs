use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Columns of `daily_activities` that a submission can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityField {
    DiagnosticCompleted,
    DailyTestsCompleted,
    WrongAnswersReviewed,
    StudyTimeMinutes,
    QuestionsSolved,
    CorrectAnswers,
    AverageScore,
}

impl ActivityField {
    pub const ALL: [ActivityField; 7] = [
        ActivityField::DiagnosticCompleted,
        ActivityField::DailyTestsCompleted,
        ActivityField::WrongAnswersReviewed,
        ActivityField::StudyTimeMinutes,
        ActivityField::QuestionsSolved,
        ActivityField::CorrectAnswers,
        ActivityField::AverageScore,
    ];

    pub const fn column(self) -> &'static str {
        match self {
            ActivityField::DiagnosticCompleted => "diagnosticCompleted",
            ActivityField::DailyTestsCompleted => "dailyTestsCompleted",
            ActivityField::WrongAnswersReviewed => "wrongAnswersReviewed",
            ActivityField::StudyTimeMinutes => "studyTimeMinutes",
            ActivityField::QuestionsSolved => "questionsSolved",
            ActivityField::CorrectAnswers => "correctAnswers",
            ActivityField::AverageScore => "averageScore",
        }
    }
}

/// How a field of an existing row combines with a new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// stored + submitted
    Accumulate,
    /// submitted value replaces the stored one
    Overwrite,
    /// submitted value replaces the stored one unless it is NULL
    OverwriteIfPresent,
}

pub type MergePolicy = [(ActivityField, MergeRule)];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityDelta {
    pub diagnostic_completed: bool,
    pub daily_tests_completed: i64,
    pub wrong_answers_reviewed: i64,
    pub study_time_minutes: i64,
    pub questions_solved: i64,
    pub correct_answers: i64,
    pub average_score: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub id: i64,
    pub activity_date: NaiveDate,
    pub diagnostic_completed: bool,
    pub daily_tests_completed: i64,
    pub wrong_answers_reviewed: i64,
    pub study_time_minutes: i64,
    pub average_score: Option<i64>,
    pub questions_solved: i64,
    pub correct_answers: i64,
    pub accuracy_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Renders the upsert for one `(user, date)` row. Insert placeholders follow
/// [`ActivityField::ALL`]; the conflict branch follows `policy`.
pub fn render_upsert_sql(policy: &MergePolicy) -> String {
    let columns: Vec<String> = ActivityField::ALL
        .iter()
        .map(|field| format!(r#""{}""#, field.column()))
        .collect();
    let placeholders = vec!["?"; ActivityField::ALL.len()].join(", ");

    let mut assignments: Vec<String> = policy
        .iter()
        .map(|(field, rule)| {
            let col = field.column();
            match rule {
                MergeRule::Accumulate => {
                    format!(r#""{col}" = "daily_activities"."{col}" + excluded."{col}""#)
                }
                MergeRule::Overwrite => format!(r#""{col}" = excluded."{col}""#),
                MergeRule::OverwriteIfPresent => format!(
                    r#""{col}" = COALESCE(excluded."{col}", "daily_activities"."{col}")"#
                ),
            }
        })
        .collect();
    assignments.push(r#""updatedAt" = excluded."updatedAt""#.to_string());

    format!(
        r#"INSERT INTO "daily_activities" ("userId", "activityDate", {columns}, "createdAt", "updatedAt")
           VALUES (?, ?, {placeholders}, ?, ?)
           ON CONFLICT ("userId", "activityDate") DO UPDATE SET {assignments}
           RETURNING *"#,
        columns = columns.join(", "),
        assignments = assignments.join(", "),
    )
}

pub async fn upsert_daily_activity(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
    delta: &ActivityDelta,
    policy: &MergePolicy,
    now: DateTime<Utc>,
) -> Result<DailyActivity, sqlx::Error> {
    let sql = render_upsert_sql(policy);
    let mut query = sqlx::query(&sql).bind(user_id).bind(date);
    for field in ActivityField::ALL {
        query = match field {
            ActivityField::DiagnosticCompleted => query.bind(delta.diagnostic_completed),
            ActivityField::DailyTestsCompleted => query.bind(delta.daily_tests_completed),
            ActivityField::WrongAnswersReviewed => query.bind(delta.wrong_answers_reviewed),
            ActivityField::StudyTimeMinutes => query.bind(delta.study_time_minutes),
            ActivityField::QuestionsSolved => query.bind(delta.questions_solved),
            ActivityField::CorrectAnswers => query.bind(delta.correct_answers),
            ActivityField::AverageScore => query.bind(delta.average_score),
        };
    }

    let row = query.bind(now).bind(now).fetch_one(&mut *conn).await?;
    map_daily_activity(&row)
}

pub async fn get_daily_activity(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
) -> Result<Option<DailyActivity>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "daily_activities" WHERE "userId" = ? AND "activityDate" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_daily_activity).transpose()
}

/// Activities on or after `since`, newest date first.
pub async fn list_daily_activities_since(
    conn: &mut SqliteConnection,
    user_id: i64,
    since: NaiveDate,
) -> Result<Vec<DailyActivity>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "daily_activities"
        WHERE "userId" = ? AND "activityDate" >= ?
        ORDER BY "activityDate" DESC
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_daily_activity).collect()
}

fn map_daily_activity(row: &SqliteRow) -> Result<DailyActivity, sqlx::Error> {
    let questions_solved: i64 = row.try_get("questionsSolved")?;
    let correct_answers: i64 = row.try_get("correctAnswers")?;
    let accuracy_rate = if questions_solved > 0 {
        correct_answers as f64 / questions_solved as f64
    } else {
        0.0
    };

    Ok(DailyActivity {
        id: row.try_get("id")?,
        activity_date: row.try_get("activityDate")?,
        diagnostic_completed: row.try_get("diagnosticCompleted")?,
        daily_tests_completed: row.try_get("dailyTestsCompleted")?,
        wrong_answers_reviewed: row.try_get("wrongAnswersReviewed")?,
        study_time_minutes: row.try_get("studyTimeMinutes")?,
        average_score: row.try_get("averageScore")?,
        questions_solved,
        correct_answers,
        accuracy_rate,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
