//! Eligibility predicates. Nothing in here touches the store: callers pass in
//! whatever facts they looked up (prior votes, attempt counts) and the clock.

use chrono::{DateTime, Utc};

use crate::engine::models::{common::UserId, poll::Poll, test::Test};
use crate::error::Error;

pub fn check_vote(poll: &Poll, voter: Option<UserId>, has_voted: bool, now: DateTime<Utc>) -> Result<(), Error> {
    if voter.is_none() && !poll.is_anonymous {
        return Err(Error::Permission("this poll does not accept anonymous votes".into()));
    }
    check_poll_open(poll, now)?;
    if voter.is_some() && has_voted && !poll.multiple_answers {
        return Err(Error::DuplicateVote);
    }
    Ok(())
}

pub fn can_vote(poll: &Poll, voter: Option<UserId>, has_voted: bool, now: DateTime<Utc>) -> bool {
    check_vote(poll, voter, has_voted, now).is_ok()
}

pub fn check_poll_open(poll: &Poll, now: DateTime<Utc>) -> Result<(), Error> {
    if !poll.active {
        return Err(Error::PollClosed);
    }
    if poll.is_past_end(now) {
        return Err(Error::DeadlineExceeded);
    }
    Ok(())
}

/// Anonymous attempts cannot be attributed to anyone, so the per-user limit does not apply to them.
pub fn check_submit_attempt(test: &Test, user: Option<UserId>, existing_attempts: i64, now: DateTime<Utc>) -> Result<(), Error> {
    if user.is_some() && existing_attempts >= test.attempt_number as i64 {
        return Err(Error::AttemptLimitExceeded);
    }
    if test.is_past_end(now) {
        return Err(Error::DeadlineExceeded);
    }
    Ok(())
}

pub fn can_submit_attempt(test: &Test, user: Option<UserId>, existing_attempts: i64, now: DateTime<Utc>) -> bool {
    check_submit_attempt(test, user, existing_attempts, now).is_ok()
}

pub fn can_modify_poll(poll: &Poll, actor: Option<UserId>) -> bool {
    actor == Some(poll.creator_id)
}

pub fn check_modify_poll(poll: &Poll, actor: Option<UserId>) -> Result<(), Error> {
    if !can_modify_poll(poll, actor) {
        return Err(Error::Permission("only the creator may change this poll".into()));
    }
    Ok(())
}

pub fn can_modify_test(test: &Test, actor: Option<UserId>) -> bool {
    actor == Some(test.owner_id)
}
