pub mod achievement;
pub mod activity;
pub mod review;
pub mod streak;
pub mod wrong_answer;

pub use achievement::{Achievement, NewAchievement};
pub use activity::{ActivityDelta, ActivityField, DailyActivity, MergePolicy, MergeRule};
pub use review::{ReviewOutcome, WrongAnswerReview};
pub use streak::StreakState;
pub use wrong_answer::{NewWrongAnswer, WrongAnswer, WrongAnswerQuery};
