//! The vote ledger. Vote rows are the source of truth; `choices.votes_count`
//! is a cache that only this module mutates, always in the same transaction
//! as the vote rows it mirrors.

use chrono::Utc;
use log::{error, info, warn};

use crate::engine::guard;
use crate::engine::models::{
    common::UserId,
    poll::PollResult,
    vote::{Eligibility, Insert as VoteInsert},
};
use crate::engine::ports::repository::{ChoiceCommon, PollCommon, Store, TxStore, VoteCommon};
use crate::engine::services::poll::{load_poll, tally};
use crate::error::Error;

pub async fn cast_vote<T>(mut storer: T, poll_id: i32, choice_id: i32, voter: Option<UserId>) -> Result<PollResult, Error>
where
    T: TxStore,
{
    let poll = PollCommon::get_for_share(&mut storer, poll_id).await?.ok_or_else(|| Error::not_found("poll", poll_id))?;
    if ChoiceCommon::get_in_poll(&mut storer, poll_id, choice_id).await?.is_none() {
        return Err(Error::not_found("choice", choice_id));
    }
    let has_voted = match voter {
        Some(uid) if !poll.multiple_answers => VoteCommon::exists(&mut storer, poll_id, uid).await?,
        _ => false,
    };
    guard::check_vote(&poll, voter, has_voted, Utc::now()).map_err(|e| refused(poll_id, voter, e))?;
    // The unique index catches a concurrent vote that passed the check above.
    VoteCommon::insert(
        &mut storer,
        VoteInsert {
            poll_id,
            choice_id,
            voter_id: voter,
            single_answer: !poll.multiple_answers,
        },
    )
    .await
    .map_err(|e| refused(poll_id, voter, e))?;
    ChoiceCommon::increment(&mut storer, choice_id).await?;
    let result = tally(&mut storer, poll).await?;
    storer.commit().await?;
    info!("vote cast in poll {} for choice {} by {:?}", poll_id, choice_id, voter);
    Ok(result)
}

fn refused(poll_id: i32, voter: Option<UserId>, e: Error) -> Error {
    if let Error::DuplicateVote = e {
        warn!("duplicate vote rejected in poll {} for {:?}", poll_id, voter);
    }
    e
}

/// Removes every vote the voter holds in the poll.
pub async fn retract_vote<T>(mut storer: T, poll_id: i32, voter: UserId) -> Result<PollResult, Error>
where
    T: TxStore,
{
    let poll = PollCommon::get_for_share(&mut storer, poll_id).await?.ok_or_else(|| Error::not_found("poll", poll_id))?;
    guard::check_poll_open(&poll, Utc::now())?;
    let votes = VoteCommon::query_for_update(&mut storer, poll_id, voter).await?;
    if votes.is_empty() {
        return Err(Error::NotFound(format!("votes of user {} in poll {}", voter, poll_id)));
    }
    for v in &votes {
        if !ChoiceCommon::decrement(&mut storer, v.choice_id).await? {
            error!("counter of choice {} is already zero while vote {} references it", v.choice_id, v.id);
            return Err(Error::ServerError(format!("vote counter of choice {} underflow", v.choice_id)));
        }
    }
    let ids: Vec<i32> = votes.iter().map(|v| v.id).collect();
    VoteCommon::delete(&mut storer, &ids).await?;
    let result = tally(&mut storer, poll).await?;
    storer.commit().await?;
    info!("{} vote(s) retracted in poll {} by user {}", ids.len(), poll_id, voter);
    Ok(result)
}

/// Sum of the cached counters of the poll's choices.
pub async fn total_votes<S>(storer: &mut S, poll_id: i32) -> Result<i64, Error>
where
    S: Store,
{
    let poll = load_poll(storer, poll_id).await?;
    Ok(tally(storer, poll).await?.total_votes)
}

pub async fn vote_eligibility<S>(storer: &mut S, poll_id: i32, voter: Option<UserId>) -> Result<Eligibility, Error>
where
    S: Store,
{
    let poll = load_poll(storer, poll_id).await?;
    let has_voted = match voter {
        Some(uid) => VoteCommon::exists(storer, poll_id, uid).await?,
        None => false,
    };
    Ok(Eligibility {
        poll_id,
        can_vote: guard::can_vote(&poll, voter, has_voted, Utc::now()),
    })
}

/// Rebuilds every counter of the poll from its vote rows. Holding the poll row
/// exclusively keeps casts and retractions out while the counters are rewritten.
pub async fn reconcile<T>(mut storer: T, actor: UserId, poll_id: i32) -> Result<PollResult, Error>
where
    T: TxStore,
{
    let poll = PollCommon::get_for_update(&mut storer, poll_id).await?.ok_or_else(|| Error::not_found("poll", poll_id))?;
    guard::check_modify_poll(&poll, Some(actor))?;
    let fixed = ChoiceCommon::recount(&mut storer, poll_id).await?;
    let result = tally(&mut storer, poll).await?;
    storer.commit().await?;
    if fixed > 0 {
        warn!("reconciled {} drifted vote counter(s) in poll {}", fixed, poll_id);
    } else {
        info!("vote counters of poll {} are consistent", poll_id);
    }
    Ok(result)
}
