use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::operations::achievement::{self, Achievement};
use crate::db::operations::activity::{
    self, ActivityDelta, ActivityField, DailyActivity, MergePolicy, MergeRule,
};
use crate::db::operations::streak::{self, StreakState};
use crate::services::ServiceError;

/// Counters add up over the day, flags and the score reflect the latest submission.
pub const DAILY_ACTIVITY_MERGE_POLICY: &MergePolicy = &[
    (ActivityField::DiagnosticCompleted, MergeRule::Overwrite),
    (ActivityField::DailyTestsCompleted, MergeRule::Accumulate),
    (ActivityField::WrongAnswersReviewed, MergeRule::Accumulate),
    (ActivityField::StudyTimeMinutes, MergeRule::Accumulate),
    (ActivityField::QuestionsSolved, MergeRule::Accumulate),
    (ActivityField::CorrectAnswers, MergeRule::Accumulate),
    (ActivityField::AverageScore, MergeRule::OverwriteIfPresent),
];

pub const MAX_ACTIVITY_WINDOW_DAYS: i64 = 365;
pub const DEFAULT_ACTIVITY_WINDOW_DAYS: i64 = 30;
const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;
const RECENT_ACHIEVEMENTS: i64 = 5;

/// Upper bounds for a single submission; same-day totals must stay inside SQLite's INTEGER.
pub const MAX_DAILY_TESTS_PER_SUBMISSION: i64 = 1_000;
pub const MAX_REVIEWS_PER_SUBMISSION: i64 = 10_000;
pub const MAX_STUDY_MINUTES_PER_SUBMISSION: i64 = 24 * 60;
pub const MAX_QUESTIONS_PER_SUBMISSION: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    Started,
    SameDay,
    Continued,
    Reset,
}

/// Applies one day of activity to the streak counters.
pub fn advance_streak(state: &StreakState, date: NaiveDate) -> (StreakState, StreakTransition) {
    let mut next = *state;

    let transition = match state.last_activity_date {
        None => {
            next.current_streak = 1;
            next.longest_streak = 1;
            next.total_study_days = 1;
            StreakTransition::Started
        }
        Some(last) if last == date => StreakTransition::SameDay,
        Some(last) if last == date - Duration::days(1) => {
            next.current_streak += 1;
            next.total_study_days += 1;
            next.longest_streak = next.longest_streak.max(next.current_streak);
            StreakTransition::Continued
        }
        Some(_) => {
            next.current_streak = 1;
            next.total_study_days += 1;
            next.longest_streak = next.longest_streak.max(1);
            StreakTransition::Reset
        }
    };

    next.last_activity_date = Some(date);
    (next, transition)
}

/// A streak whose last day is older than yesterday is broken; `None` when
/// nothing needs to change.
pub fn correct_for_read(state: &StreakState, today: NaiveDate) -> Option<StreakState> {
    let last = state.last_activity_date?;
    if last < today - Duration::days(1) && state.current_streak > 0 {
        Some(StreakState {
            current_streak: 0,
            ..*state
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedActivity {
    pub activity: DailyActivity,
    pub streak: StreakState,
    pub transition: StreakTransition,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakView {
    #[serde(flatten)]
    pub state: StreakState,
    pub is_active_today: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub study_days: i64,
    pub total_study_time: i64,
    pub total_questions: i64,
    pub average_score: f64,
    pub accuracy_rate: f64,
    pub consistency_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub streak: StreakView,
    pub recent_activities: Vec<DailyActivity>,
    pub recent_achievements: Vec<Achievement>,
    pub weekly_summary: PeriodSummary,
    pub monthly_summary: PeriodSummary,
}

fn validate_delta(delta: &ActivityDelta) -> Result<(), ServiceError> {
    let counters = [
        ("dailyTestsCompleted", delta.daily_tests_completed, MAX_DAILY_TESTS_PER_SUBMISSION),
        ("wrongAnswersReviewed", delta.wrong_answers_reviewed, MAX_REVIEWS_PER_SUBMISSION),
        ("studyTimeMinutes", delta.study_time_minutes, MAX_STUDY_MINUTES_PER_SUBMISSION),
        ("questionsSolved", delta.questions_solved, MAX_QUESTIONS_PER_SUBMISSION),
        ("correctAnswers", delta.correct_answers, MAX_QUESTIONS_PER_SUBMISSION),
    ];
    for (name, value, max) in counters {
        if !(0..=max).contains(&value) {
            return Err(ServiceError::validation(format!("{name} must be between 0 and {max}")));
        }
    }

    if let Some(score) = delta.average_score {
        if !(0..=100).contains(&score) {
            return Err(ServiceError::validation("averageScore must be between 0 and 100"));
        }
    }

    Ok(())
}

/// Upserts the day's activity row and moves the streak forward.
///
/// The activity upsert runs first so that, inside a transaction, the write
/// lock is held before the streak row is read.
pub async fn record_activity(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
    delta: &ActivityDelta,
    now: DateTime<Utc>,
) -> Result<RecordedActivity, ServiceError> {
    validate_delta(delta)?;

    let activity = activity::upsert_daily_activity(
        conn,
        user_id,
        date,
        delta,
        DAILY_ACTIVITY_MERGE_POLICY,
        now,
    )
    .await?;

    let current = streak::get_or_create_streak(conn, user_id, now).await?;
    let (next, transition) = advance_streak(&current, date);
    if next != current {
        streak::save_streak(conn, user_id, &next, now).await?;
    }

    tracing::debug!(
        user_id,
        %date,
        ?transition,
        current_streak = next.current_streak,
        longest_streak = next.longest_streak,
        "daily activity recorded"
    );

    Ok(RecordedActivity {
        activity,
        streak: next,
        transition,
    })
}

pub async fn get_streak(
    conn: &mut SqliteConnection,
    user_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<StreakView, ServiceError> {
    let mut state = streak::get_or_create_streak(conn, user_id, now).await?;

    if let Some(corrected) = correct_for_read(&state, today) {
        tracing::debug!(user_id, broken_streak = state.current_streak, "streak broken");
        streak::save_streak(conn, user_id, &corrected, now).await?;
        state = corrected;
    }

    let is_active_today = activity::get_daily_activity(conn, user_id, today)
        .await?
        .is_some();

    Ok(StreakView {
        state,
        is_active_today,
    })
}

/// Activities of the last `days` days including `today`, newest first.
pub async fn list_activities(
    conn: &mut SqliteConnection,
    user_id: i64,
    today: NaiveDate,
    days: i64,
) -> Result<Vec<DailyActivity>, ServiceError> {
    if !(1..=MAX_ACTIVITY_WINDOW_DAYS).contains(&days) {
        return Err(ServiceError::validation(format!(
            "days must be between 1 and {MAX_ACTIVITY_WINDOW_DAYS}"
        )));
    }

    let since = window_start(today, days);
    Ok(activity::list_daily_activities_since(conn, user_id, since).await?)
}

pub async fn learning_stats(
    conn: &mut SqliteConnection,
    user_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LearningStats, ServiceError> {
    let streak = get_streak(conn, user_id, today, now).await?;

    let month_start = window_start(today, MONTH_DAYS);
    let month = activity::list_daily_activities_since(conn, user_id, month_start).await?;
    let week_start = window_start(today, WEEK_DAYS);
    let week: Vec<DailyActivity> = month
        .iter()
        .filter(|a| a.activity_date >= week_start)
        .cloned()
        .collect();

    let recent_achievements =
        achievement::list_achievements(conn, user_id, Some(RECENT_ACHIEVEMENTS)).await?;

    Ok(LearningStats {
        streak,
        weekly_summary: summarize(&week, WEEK_DAYS),
        monthly_summary: summarize(&month, MONTH_DAYS),
        recent_activities: week,
        recent_achievements,
    })
}

fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days - 1)
}

pub fn summarize(activities: &[DailyActivity], window_days: i64) -> PeriodSummary {
    if activities.is_empty() || window_days <= 0 {
        return PeriodSummary::default();
    }

    let study_days = activities.len() as i64;
    let total_study_time = saturating_total(activities.iter().map(|a| a.study_time_minutes));
    let total_questions = saturating_total(activities.iter().map(|a| a.questions_solved));
    let total_correct = saturating_total(activities.iter().map(|a| a.correct_answers));

    let scores: Vec<i64> = activities.iter().filter_map(|a| a.average_score).collect();
    let average_score = if scores.is_empty() {
        0.0
    } else {
        saturating_total(scores.iter().copied()) as f64 / scores.len() as f64
    };

    let accuracy_rate = if total_questions > 0 {
        total_correct as f64 / total_questions as f64 * 100.0
    } else {
        0.0
    };

    PeriodSummary {
        study_days,
        total_study_time,
        total_questions,
        average_score: round1(average_score),
        accuracy_rate: round1(accuracy_rate),
        consistency_rate: round1((study_days as f64 / window_days as f64 * 100.0).min(100.0)),
    }
}

fn saturating_total(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + Duration::days(offset)
    }

    fn activity_on(
        date: NaiveDate,
        minutes: i64,
        solved: i64,
        correct: i64,
        score: Option<i64>,
    ) -> DailyActivity {
        DailyActivity {
            id: 0,
            activity_date: date,
            diagnostic_completed: false,
            daily_tests_completed: 0,
            wrong_answers_reviewed: 0,
            study_time_minutes: minutes,
            average_score: score,
            questions_solved: solved,
            correct_answers: correct,
            accuracy_rate: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_activity_starts_streak() {
        let (next, transition) = advance_streak(&StreakState::default(), day(0));
        assert_eq!(transition, StreakTransition::Started);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.total_study_days, 1);
        assert_eq!(next.last_activity_date, Some(day(0)));
    }

    #[test]
    fn consecutive_day_continues() {
        let (s1, _) = advance_streak(&StreakState::default(), day(0));
        let (s2, transition) = advance_streak(&s1, day(1));
        assert_eq!(transition, StreakTransition::Continued);
        assert_eq!(s2.current_streak, 2);
        assert_eq!(s2.longest_streak, 2);
        assert_eq!(s2.total_study_days, 2);
    }

    #[test]
    fn gap_resets_current_but_not_longest() {
        let (s1, _) = advance_streak(&StreakState::default(), day(0));
        let (s2, _) = advance_streak(&s1, day(1));
        let (s3, transition) = advance_streak(&s2, day(4));
        assert_eq!(transition, StreakTransition::Reset);
        assert_eq!(s3.current_streak, 1);
        assert_eq!(s3.longest_streak, 2);
        assert_eq!(s3.total_study_days, 3);
    }

    #[test]
    fn same_day_is_idempotent() {
        let (s1, _) = advance_streak(&StreakState::default(), day(0));
        let (s2, transition) = advance_streak(&s1, day(0));
        assert_eq!(transition, StreakTransition::SameDay);
        assert_eq!(s1, s2);
    }

    #[test]
    fn backdated_activity_resets() {
        let (s1, _) = advance_streak(&StreakState::default(), day(5));
        let (s2, transition) = advance_streak(&s1, day(2));
        assert_eq!(transition, StreakTransition::Reset);
        assert_eq!(s2.current_streak, 1);
        assert_eq!(s2.last_activity_date, Some(day(2)));
    }

    #[test]
    fn read_correction_zeroes_stale_streak() {
        let state = StreakState {
            current_streak: 4,
            longest_streak: 6,
            last_activity_date: Some(day(0)),
            total_study_days: 10,
        };
        assert_eq!(correct_for_read(&state, day(1)), None);
        let corrected = correct_for_read(&state, day(2)).unwrap();
        assert_eq!(corrected.current_streak, 0);
        assert_eq!(corrected.longest_streak, 6);
        assert_eq!(corrected.total_study_days, 10);
    }

    #[test]
    fn read_correction_ignores_empty_state() {
        assert_eq!(correct_for_read(&StreakState::default(), day(9)), None);
    }

    #[test]
    fn summarize_rounds_and_caps() {
        let activities = vec![
            activity_on(day(0), 30, 10, 7, Some(80)),
            activity_on(day(1), 45, 20, 13, None),
            activity_on(day(2), 15, 0, 0, Some(65)),
        ];
        let summary = summarize(&activities, 7);
        assert_eq!(summary.study_days, 3);
        assert_eq!(summary.total_study_time, 90);
        assert_eq!(summary.total_questions, 30);
        assert_eq!(summary.average_score, 72.5);
        assert_eq!(summary.accuracy_rate, 66.7);
        assert_eq!(summary.consistency_rate, 42.9);
    }

    #[test]
    fn summarize_empty_is_zeroed() {
        assert_eq!(summarize(&[], 30), PeriodSummary::default());
    }

    #[test]
    fn negative_counters_are_rejected() {
        let delta = ActivityDelta {
            questions_solved: -1,
            ..ActivityDelta::default()
        };
        assert!(matches!(validate_delta(&delta), Err(ServiceError::Validation(_))));

        let delta = ActivityDelta {
            average_score: Some(101),
            ..ActivityDelta::default()
        };
        assert!(matches!(validate_delta(&delta), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn oversized_counters_are_rejected() {
        let delta = ActivityDelta {
            questions_solved: i64::MAX,
            ..ActivityDelta::default()
        };
        assert!(matches!(validate_delta(&delta), Err(ServiceError::Validation(_))));

        let delta = ActivityDelta {
            study_time_minutes: MAX_STUDY_MINUTES_PER_SUBMISSION + 1,
            ..ActivityDelta::default()
        };
        assert!(matches!(validate_delta(&delta), Err(ServiceError::Validation(_))));

        let delta = ActivityDelta {
            questions_solved: MAX_QUESTIONS_PER_SUBMISSION,
            correct_answers: MAX_QUESTIONS_PER_SUBMISSION,
            study_time_minutes: MAX_STUDY_MINUTES_PER_SUBMISSION,
            ..ActivityDelta::default()
        };
        assert!(validate_delta(&delta).is_ok());
    }

    #[test]
    fn summarize_saturates_instead_of_overflowing() {
        let activities = vec![
            activity_on(day(0), i64::MAX, i64::MAX, i64::MAX, Some(90)),
            activity_on(day(1), 10, 5, 5, Some(70)),
        ];
        let summary = summarize(&activities, 7);
        assert_eq!(summary.total_study_time, i64::MAX);
        assert_eq!(summary.total_questions, i64::MAX);
        assert_eq!(summary.accuracy_rate, 100.0);
        assert_eq!(summary.average_score, 80.0);
    }

    proptest! {
        #[test]
        fn longest_never_below_current_nor_decreasing(
            offsets in prop::collection::vec(-3i64..40, 1..60)
        ) {
            let mut state = StreakState::default();
            for offset in offsets {
                let (next, _) = advance_streak(&state, day(offset));
                prop_assert!(next.longest_streak >= next.current_streak);
                prop_assert!(next.longest_streak >= state.longest_streak);
                prop_assert!(next.total_study_days >= state.total_study_days);
                state = next;
            }
        }
    }
}
