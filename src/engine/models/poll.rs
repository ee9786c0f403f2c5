use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::models::common::UserId;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Poll {
    pub id: i32,
    pub title: String,
    pub creator_id: UserId,
    pub is_anonymous: bool,
    pub multiple_answers: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Poll {
    /// A poll accepts votes while it is active and its end date, if any, lies in the future.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_past_end(now)
    }

    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map_or(false, |end| end <= now)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Choice {
    pub id: i32,
    pub poll_id: i32,
    pub choice_text: String,
    pub votes_count: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceCreate {
    pub choice_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollCreate {
    pub title: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub multiple_answers: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub choices: Vec<ChoiceCreate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollUpdate {
    pub active: Option<bool>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub title: String,
    pub creator_id: UserId,
    pub is_anonymous: bool,
    pub multiple_answers: bool,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub active: bool,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct Query {
    pub active_eq: Option<bool>,
    pub creator_id_eq: Option<UserId>,
    /// Keeps only polls whose end date, if any, lies after this instant.
    pub open_at: Option<DateTime<Utc>>,
}

/// A poll together with its live tally.
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    #[serde(flatten)]
    pub poll: Poll,
    pub choices: Vec<Choice>,
    pub total_votes: i64,
    pub is_active: bool,
}

impl PollResult {
    pub fn new(poll: Poll, choices: Vec<Choice>, now: DateTime<Utc>) -> Self {
        let total_votes = choices.iter().map(|c| c.votes_count as i64).sum();
        let is_active = poll.is_open(now);
        Self {
            poll,
            choices,
            total_votes,
            is_active,
        }
    }
}
