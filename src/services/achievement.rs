use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::operations::achievement::{self, Achievement, NewAchievement};
use crate::db::operations::streak::StreakState;
use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    Streak,
    Consistency,
}

impl AchievementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::Consistency => "consistency",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Streak => "#FF6B35",
            Self::Consistency => "#4ECDC4",
        }
    }
}

/// One rung of a badge ladder, granted once the measured value reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub kind: AchievementKind,
    pub threshold: i64,
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

impl Milestone {
    fn as_new(&self) -> NewAchievement<'static> {
        NewAchievement {
            achievement_type: self.kind.as_str(),
            achievement_key: self.key,
            title: self.title,
            description: self.description,
            icon: self.icon,
            color: self.kind.color(),
        }
    }
}

const fn streak(
    threshold: i64,
    key: &'static str,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
) -> Milestone {
    Milestone {
        kind: AchievementKind::Streak,
        threshold,
        key,
        title,
        description,
        icon,
    }
}

const fn consistency(
    threshold: i64,
    key: &'static str,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
) -> Milestone {
    Milestone {
        kind: AchievementKind::Consistency,
        threshold,
        key,
        title,
        description,
        icon,
    }
}

/// Measured against `currentStreak`.
pub static STREAK_LADDER: [Milestone; 5] = [
    streak(3, "streak_3", "3-Day Streak", "Studied 3 days in a row", "🔥"),
    streak(7, "streak_7", "One-Week Streak", "Studied 7 days in a row", "⭐"),
    streak(14, "streak_14", "Two-Week Streak", "Studied 14 days in a row", "🏅"),
    streak(30, "streak_30", "One-Month Streak", "Studied 30 days in a row", "🏆"),
    streak(100, "streak_100", "100-Day Streak", "Studied 100 days in a row", "👑"),
];

/// Measured against `totalStudyDays`.
pub static CONSISTENCY_LADDER: [Milestone; 4] = [
    consistency(50, "total_50", "50 Study Days", "Studied on 50 different days", "📚"),
    consistency(100, "total_100", "100 Study Days", "Studied on 100 different days", "🎓"),
    consistency(200, "total_200", "200 Study Days", "Studied on 200 different days", "💎"),
    consistency(365, "total_365", "A Year of Study", "Studied on 365 different days", "🌟"),
];

/// Milestones reached by the given totals that the user does not hold yet.
pub fn evaluate(
    current_streak: i64,
    total_study_days: i64,
    existing_keys: &HashSet<String>,
) -> Vec<&'static Milestone> {
    let streaks = STREAK_LADDER
        .iter()
        .filter(move |m| current_streak >= m.threshold);
    let totals = CONSISTENCY_LADDER
        .iter()
        .filter(move |m| total_study_days >= m.threshold);

    streaks
        .chain(totals)
        .filter(|m| !existing_keys.contains(m.key))
        .collect()
}

/// Grants every newly reached milestone and returns the rows actually inserted.
pub async fn award_achievements(
    conn: &mut SqliteConnection,
    user_id: i64,
    state: &StreakState,
    now: DateTime<Utc>,
) -> Result<Vec<Achievement>, ServiceError> {
    let existing = achievement::existing_achievement_keys(conn, user_id).await?;
    let due = evaluate(state.current_streak, state.total_study_days, &existing);

    let mut granted = Vec::with_capacity(due.len());
    for milestone in due {
        // A concurrent grant of the same key loses to the unique index.
        if let Some(row) =
            achievement::insert_achievement(conn, user_id, milestone.as_new(), now).await?
        {
            tracing::info!(user_id, key = milestone.key, "achievement granted");
            granted.push(row);
        }
    }

    Ok(granted)
}

pub async fn list_achievements(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<Achievement>, ServiceError> {
    Ok(achievement::list_achievements(conn, user_id, None).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(milestones: &[&Milestone]) -> Vec<&'static str> {
        milestones.iter().map(|m| m.key).collect()
    }

    #[test]
    fn nothing_below_first_threshold() {
        assert!(evaluate(2, 49, &HashSet::new()).is_empty());
    }

    #[test]
    fn every_crossed_threshold_is_granted() {
        let due = evaluate(14, 100, &HashSet::new());
        assert_eq!(
            keys(&due),
            vec!["streak_3", "streak_7", "streak_14", "total_50", "total_100"]
        );
    }

    #[test]
    fn held_keys_are_skipped() {
        let existing: HashSet<String> = ["streak_3", "streak_7"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let due = evaluate(7, 10, &existing);
        assert!(due.is_empty());

        let due = evaluate(14, 10, &existing);
        assert_eq!(keys(&due), vec!["streak_14"]);
    }

    #[test]
    fn ladders_carry_kind_and_color() {
        for m in STREAK_LADDER.iter() {
            assert_eq!(m.kind, AchievementKind::Streak);
            assert!(m.key.starts_with("streak_"));
            assert_eq!(m.as_new().color, "#FF6B35");
        }
        for m in CONSISTENCY_LADDER.iter() {
            assert_eq!(m.kind, AchievementKind::Consistency);
            assert!(m.key.starts_with("total_"));
            assert_eq!(m.as_new().color, "#4ECDC4");
        }
    }

    #[test]
    fn ladder_keys_match_thresholds() {
        for m in STREAK_LADDER.iter().chain(CONSISTENCY_LADDER.iter()) {
            assert!(m.key.ends_with(&format!("_{}", m.threshold)));
        }
    }
}
