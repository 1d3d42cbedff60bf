use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};

use crate::db::operations::review::{self, WrongAnswerReview};
use crate::db::operations::wrong_answer::{
    self, GroupColumn, NewWrongAnswer, WrongAnswer, WrongAnswerQuery,
};
use crate::services::ServiceError;

pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 5.0;
pub const DEFAULT_QUERY_LIMIT: i64 = 20;
pub const MAX_QUERY_LIMIT: i64 = 100;
pub const MAX_BULK_ITEMS: usize = 200;
const REVIEW_NEEDED_AFTER_DAYS: i64 = 3;
const RECENT_REVIEWS: i64 = 5;
const UNLABELED: &str = "other";

/// `(label, min, max)`; the last bucket includes its upper bound.
const DIFFICULTY_BUCKETS: [(&str, f64, f64); 4] = [
    ("1.0-2.0", 1.0, 2.0),
    ("2.0-3.0", 2.0, 3.0),
    ("3.0-4.0", 3.0, 4.0),
    ("4.0-5.0", 4.0, 5.0),
];

/// Raw filter as it arrives from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerFilter {
    pub subject: Option<String>,
    pub unit: Option<String>,
    pub difficulty_min: Option<f64>,
    pub difficulty_max: Option<f64>,
    pub mastered: Option<bool>,
    pub source_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl WrongAnswerFilter {
    pub fn validate(self) -> Result<WrongAnswerQuery, ServiceError> {
        for (name, value) in [
            ("difficultyMin", self.difficulty_min),
            ("difficultyMax", self.difficulty_max),
        ] {
            if let Some(v) = value {
                check_difficulty(name, v)?;
            }
        }
        if let (Some(min), Some(max)) = (self.difficulty_min, self.difficulty_max) {
            if min > max {
                return Err(ServiceError::validation(
                    "difficultyMin must not exceed difficultyMax",
                ));
            }
        }

        let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
            return Err(ServiceError::validation(format!(
                "limit must be between 1 and {MAX_QUERY_LIMIT}"
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ServiceError::validation("offset must not be negative"));
        }

        Ok(WrongAnswerQuery {
            subject: non_empty(self.subject),
            unit: non_empty(self.unit),
            difficulty_min: self.difficulty_min,
            difficulty_max: self.difficulty_max,
            mastered: self.mastered,
            source_type: non_empty(self.source_type),
            limit,
            offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_difficulty(name: &str, value: f64) -> Result<(), ServiceError> {
    if value.is_finite() && (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&value) {
        Ok(())
    } else {
        Err(ServiceError::validation(format!(
            "{name} must be between {MIN_DIFFICULTY:.1} and {MAX_DIFFICULTY:.1}"
        )))
    }
}

fn validate_item(item: &NewWrongAnswer) -> Result<(), ServiceError> {
    check_difficulty("difficulty", item.difficulty)?;
    if item.points < 0 {
        return Err(ServiceError::validation("points must not be negative"));
    }
    if item.source_type.trim().is_empty() {
        return Err(ServiceError::validation("sourceType must not be empty"));
    }
    if item.question_content.trim().is_empty() {
        return Err(ServiceError::validation("questionContent must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerStats {
    pub total_count: i64,
    pub mastered_count: i64,
    pub review_needed_count: i64,
    pub by_subject: BTreeMap<String, i64>,
    pub by_unit: BTreeMap<String, i64>,
    pub by_difficulty: BTreeMap<String, i64>,
    pub recent_reviews: Vec<WrongAnswerReview>,
}

/// Stores a wrong answer, or refreshes `userAnswer` on the existing row for
/// the same `(user, question, sourceType)`.
pub async fn add_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    item: &NewWrongAnswer,
    now: DateTime<Utc>,
) -> Result<WrongAnswer, ServiceError> {
    validate_item(item)?;

    let stored = wrong_answer::upsert_wrong_answer(conn, user_id, item, now).await?;
    if stored.created_at != now {
        tracing::debug!(user_id, item_id = stored.id, "wrong answer already stored, refreshed");
    }

    Ok(stored)
}

/// Adds each item in its own savepoint; items that fail are logged and skipped.
pub async fn bulk_add_wrong_answers(
    conn: &mut SqliteConnection,
    user_id: i64,
    items: &[NewWrongAnswer],
    now: DateTime<Utc>,
) -> Result<Vec<WrongAnswer>, ServiceError> {
    if items.len() > MAX_BULK_ITEMS {
        return Err(ServiceError::validation(format!(
            "at most {MAX_BULK_ITEMS} items per request"
        )));
    }

    let mut stored = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut savepoint = conn.begin().await?;
        match add_wrong_answer(&mut savepoint, user_id, item, now).await {
            Ok(row) => {
                savepoint.commit().await?;
                stored.push(row);
            }
            Err(err) => {
                savepoint.rollback().await?;
                tracing::warn!(
                    user_id,
                    index,
                    question_id = item.question_id,
                    error = %err,
                    "skipping wrong answer in bulk add"
                );
            }
        }
    }

    Ok(stored)
}

pub async fn query_wrong_answers(
    conn: &mut SqliteConnection,
    user_id: i64,
    filter: WrongAnswerFilter,
) -> Result<Vec<WrongAnswer>, ServiceError> {
    let query = filter.validate()?;
    Ok(wrong_answer::query_wrong_answers(conn, user_id, &query).await?)
}

pub async fn get_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<WrongAnswer, ServiceError> {
    wrong_answer::get_wrong_answer(conn, user_id, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Wrong answer not found"))
}

pub async fn delete_wrong_answer(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<(), ServiceError> {
    if !wrong_answer::delete_wrong_answer(conn, user_id, id).await? {
        return Err(ServiceError::not_found("Wrong answer not found"));
    }
    tracing::debug!(user_id, item_id = id, "wrong answer deleted");
    Ok(())
}

pub async fn wrong_answer_stats(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<WrongAnswerStats, ServiceError> {
    let total_count = wrong_answer::count_wrong_answers(conn, user_id, None).await?;
    let mastered_count = wrong_answer::count_wrong_answers(conn, user_id, Some(true)).await?;
    let review_needed_count = wrong_answer::count_review_needed(
        conn,
        user_id,
        now - Duration::days(REVIEW_NEEDED_AFTER_DAYS),
    )
    .await?;

    let by_subject = label_counts(
        wrong_answer::count_grouped_by(conn, user_id, GroupColumn::Subject).await?,
    );
    let by_unit =
        label_counts(wrong_answer::count_grouped_by(conn, user_id, GroupColumn::Unit).await?);

    let mut by_difficulty = BTreeMap::new();
    let last = DIFFICULTY_BUCKETS.len() - 1;
    for (i, (label, min, max)) in DIFFICULTY_BUCKETS.iter().enumerate() {
        let count =
            wrong_answer::count_in_difficulty_range(conn, user_id, *min, *max, i == last).await?;
        by_difficulty.insert(label.to_string(), count);
    }

    let recent_reviews = review::recent_reviews_for_user(conn, user_id, RECENT_REVIEWS).await?;

    Ok(WrongAnswerStats {
        total_count,
        mastered_count,
        review_needed_count,
        by_subject,
        by_unit,
        by_difficulty,
        recent_reviews,
    })
}

/// Folds grouped counts into a map, collecting blank labels under "other".
fn label_counts(groups: Vec<(Option<String>, i64)>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for (label, count) in groups {
        let key = match label {
            Some(l) if !l.trim().is_empty() => l,
            _ => UNLABELED.to_string(),
        };
        *out.entry(key).or_insert(0) += count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(difficulty: f64) -> NewWrongAnswer {
        NewWrongAnswer {
            question_id: 1,
            question_content: "2 + 2".into(),
            user_answer: "5".into(),
            correct_answer: "4".into(),
            explanation: None,
            unit: None,
            subject: None,
            topic: None,
            difficulty,
            points: 3,
            source_type: "daily_test".into(),
            source_id: None,
        }
    }

    #[test]
    fn filter_defaults() {
        let query = WrongAnswerFilter::default().validate().unwrap();
        assert_eq!(query.limit, DEFAULT_QUERY_LIMIT);
        assert_eq!(query.offset, 0);
        assert!(query.subject.is_none());
    }

    #[test]
    fn filter_rejects_inverted_difficulty() {
        let filter = WrongAnswerFilter {
            difficulty_min: Some(4.0),
            difficulty_max: Some(2.0),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn filter_rejects_out_of_range_values() {
        let cases = [
            WrongAnswerFilter { difficulty_min: Some(0.5), ..Default::default() },
            WrongAnswerFilter { difficulty_max: Some(5.5), ..Default::default() },
            WrongAnswerFilter { limit: Some(0), ..Default::default() },
            WrongAnswerFilter { limit: Some(101), ..Default::default() },
            WrongAnswerFilter { offset: Some(-1), ..Default::default() },
        ];
        for filter in cases {
            assert!(filter.validate().is_err());
        }
    }

    #[test]
    fn blank_text_filters_are_dropped() {
        let filter = WrongAnswerFilter {
            subject: Some("  ".into()),
            unit: Some("algebra".into()),
            ..Default::default()
        };
        let query = filter.validate().unwrap();
        assert!(query.subject.is_none());
        assert_eq!(query.unit.as_deref(), Some("algebra"));
    }

    #[test]
    fn item_difficulty_is_bounded() {
        assert!(validate_item(&item(1.0)).is_ok());
        assert!(validate_item(&item(5.0)).is_ok());
        assert!(validate_item(&item(0.9)).is_err());
        assert!(validate_item(&item(f64::NAN)).is_err());
    }

    #[test]
    fn missing_labels_become_other() {
        let counts = label_counts(vec![
            (Some("math".into()), 3),
            (None, 2),
            (Some("".into()), 1),
        ]);
        assert_eq!(counts.get("math"), Some(&3));
        assert_eq!(counts.get(UNLABELED), Some(&3));
    }
}
