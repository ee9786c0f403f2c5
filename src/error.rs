use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::Serialize;
use thiserror::Error as ThisError;

/// Partial unique index enforcing one vote per voter on single answer polls.
pub const VOTES_SINGLE_ANSWER_KEY: &str = "votes_single_answer_key";
/// Composite foreign key tying a vote's choice to the vote's poll.
pub const VOTES_CHOICE_IN_POLL_FKEY: &str = "votes_choice_in_poll_fkey";
pub const TEST_ATTEMPTS_SEQ_KEY: &str = "test_attempts_seq_key";
pub const TEST_ATTEMPTS_SEQ_WITHIN_LIMIT: &str = "test_attempts_seq_within_limit";

const PG_QUERY_CANCELED: &str = "57014";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("already voted in this poll")]
    DuplicateVote,

    #[error("attempt limit exceeded")]
    AttemptLimitExceeded,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("poll is closed")]
    PollClosed,

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("task {0} does not belong to this test")]
    UnknownTask(i32),

    #[error("storage timeout")]
    StorageTimeout,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("config error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl Error {
    pub fn not_found(what: &str, id: i32) -> Self {
        Error::NotFound(format!("{} {}", what, id))
    }

    /// Translates a violated store constraint into the error it stands for.
    pub fn from_constraint(name: &str) -> Option<Self> {
        match name {
            VOTES_SINGLE_ANSWER_KEY => Some(Error::DuplicateVote),
            VOTES_CHOICE_IN_POLL_FKEY => Some(Error::NotFound("choice in poll".into())),
            TEST_ATTEMPTS_SEQ_KEY | TEST_ATTEMPTS_SEQ_WITHIN_LIMIT => Some(Error::AttemptLimitExceeded),
            _ => None,
        }
    }

    /// Infrastructure faults the caller may retry. Everything else is a client error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageTimeout | Error::Database(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let translated = match &e {
            sqlx::Error::PoolTimedOut => Some(Error::StorageTimeout),
            sqlx::Error::Database(db) => {
                if db.code().as_deref() == Some(PG_QUERY_CANCELED) {
                    Some(Error::StorageTimeout)
                } else {
                    db.constraint().and_then(Error::from_constraint)
                }
            }
            _ => None,
        };
        translated.unwrap_or(Error::Database(e))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::UnknownTask(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateVote | Error::AttemptLimitExceeded => StatusCode::CONFLICT,
            Error::DeadlineExceeded | Error::PollClosed | Error::Permission(_) => StatusCode::FORBIDDEN,
            Error::StorageTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Migrate(_) | Error::Config(_) | Error::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = if self.status_code().is_server_error() {
            log::error!("{}", self);
            "internal server error".to_owned()
        } else {
            self.to_string()
        };
        let mut resp = HttpResponse::build(self.status_code());
        if self.is_retryable() {
            resp.insert_header((header::RETRY_AFTER, "1"));
        }
        resp.json(ErrorBody { detail })
    }
}
