use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::models::common::UserId;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestAttempt {
    pub id: i32,
    pub test_id: i32,
    pub user_id: Option<UserId>,
    /// Position of this attempt among the user's attempts, starting at 1. Null for anonymous attempts.
    pub seq: Option<i32>,
    pub score_obtained: i32,
    pub total_score: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerSubmit {
    pub task: i32,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub selected_options: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptSubmit {
    pub answers: Vec<AnswerSubmit>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub test_id: i32,
    pub user_id: Option<UserId>,
    pub seq: Option<i32>,
    pub attempt_limit: i32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub score_obtained: i32,
    pub total_score: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AnswerInsert {
    pub attempt_id: i32,
    pub task_id: i32,
    pub answer_text: Option<String>,
    pub selected_options: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub task_id: i32,
    pub awarded: i32,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradedAttempt {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub results: Vec<TaskResult>,
}
