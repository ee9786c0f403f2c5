use chrono::Utc;
use log::info;

use crate::engine::guard;
use crate::engine::models::{
    common::{Pagination, UserId},
    poll::{Insert as PollInsert, Poll, PollCreate, PollResult, PollUpdate, Query as PollQuery, Update},
};
use crate::engine::ports::repository::{ChoiceCommon, Common, PollCommon, Store, TxStore};
use crate::error::Error;

const MAX_CHOICE_LEN: usize = 255;
const MAX_TITLE_LEN: usize = 255;

fn validate(poll: &PollCreate) -> Result<(), Error> {
    let title = poll.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("poll title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!("poll title is longer than {} characters", MAX_TITLE_LEN)));
    }
    if poll.choices.is_empty() {
        return Err(Error::Validation("a poll needs at least one choice".into()));
    }
    for c in &poll.choices {
        if c.choice_text.trim().is_empty() {
            return Err(Error::Validation("choice text must not be empty".into()));
        }
        if c.choice_text.chars().count() > MAX_CHOICE_LEN {
            return Err(Error::Validation(format!("choice text is longer than {} characters", MAX_CHOICE_LEN)));
        }
    }
    Ok(())
}

pub(crate) async fn load_poll<S>(storer: &mut S, id: i32) -> Result<Poll, Error>
where
    S: Common,
{
    PollCommon::get(storer, id).await?.ok_or_else(|| Error::not_found("poll", id))
}

pub(crate) async fn tally<S>(storer: &mut S, poll: Poll) -> Result<PollResult, Error>
where
    S: Common,
{
    let choices = ChoiceCommon::query(storer, poll.id).await?;
    Ok(PollResult::new(poll, choices, Utc::now()))
}

pub async fn create_poll<T>(mut storer: T, creator: UserId, poll: PollCreate) -> Result<PollResult, Error>
where
    T: TxStore,
{
    validate(&poll)?;
    let created = PollCommon::insert(
        &mut storer,
        PollInsert {
            title: poll.title.trim().to_owned(),
            creator_id: creator,
            is_anonymous: poll.is_anonymous,
            multiple_answers: poll.multiple_answers,
            end_date: poll.end_date,
        },
    )
    .await?;
    let choices = ChoiceCommon::bulk_insert(&mut storer, created.id, poll.choices.into_iter().map(|c| c.choice_text.trim().to_owned()).collect()).await?;
    storer.commit().await?;
    info!("poll {} created by user {} with {} choices", created.id, creator, choices.len());
    Ok(PollResult::new(created, choices, Utc::now()))
}

pub async fn poll_result<S>(storer: &mut S, id: i32) -> Result<PollResult, Error>
where
    S: Store,
{
    let poll = load_poll(storer, id).await?;
    tally(storer, poll).await
}

/// Polls still accepting votes, newest first.
pub async fn list_polls<S>(storer: &mut S, pagination: Pagination) -> Result<(Vec<PollResult>, i64), Error>
where
    S: Store,
{
    let query = PollQuery {
        active_eq: Some(true),
        open_at: Some(Utc::now()),
        ..default::default()
    };
    let total = PollCommon::count(storer, &query).await?;
    let polls = PollCommon::query(storer, &query, pagination).await?;
    let mut results = Vec::with_capacity(polls.len());
    for p in polls {
        results.push(tally(storer, p).await?);
    }
    Ok((results, total))
}

/// Only `active` and `end_date` may change once a poll exists, and only by its creator.
pub async fn update_poll<T>(mut storer: T, actor: UserId, id: i32, update: PollUpdate) -> Result<PollResult, Error>
where
    T: TxStore,
{
    let poll = PollCommon::get_for_update(&mut storer, id).await?.ok_or_else(|| Error::not_found("poll", id))?;
    guard::check_modify_poll(&poll, Some(actor))?;
    let updated = PollCommon::update(
        &mut storer,
        id,
        Update {
            active: update.active.unwrap_or(poll.active),
            end_date: update.end_date.or(poll.end_date),
        },
    )
    .await?;
    let result = tally(&mut storer, updated).await?;
    storer.commit().await?;
    info!("poll {} updated by user {}: active={} end_date={:?}", id, actor, result.poll.active, result.poll.end_date);
    Ok(result)
}
