use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::models::common::UserId;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vote {
    pub id: i32,
    pub poll_id: i32,
    pub choice_id: i32,
    pub voter_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteCast {
    pub choice_id: i32,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub poll_id: i32,
    pub choice_id: i32,
    pub voter_id: Option<UserId>,
    /// Copied from the poll so the store can index one-vote-per-voter rows.
    pub single_answer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Eligibility {
    pub poll_id: i32,
    pub can_vote: bool,
}
