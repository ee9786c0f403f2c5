use actix_web::web::{Data, Json, Path, Query};
use actix_web::HttpResponse;

use crate::context::UserInfo;
use crate::engine::models::poll::{PollCreate, PollResult, PollUpdate};
use crate::engine::models::vote::{Eligibility, VoteCast};
use crate::engine::ports::repository::{Manager, Store, TxStore};
use crate::engine::services::{ledger, poll};
use crate::error::Error;
use crate::request::Pagination;
use crate::response::List;

pub async fn create<M, S, T>(user_info: UserInfo, Json(body): Json<PollCreate>, manager: Data<M>) -> Result<HttpResponse, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let created = poll::create_poll(manager.tx().await?, user_info.id, body).await?;
    Ok(HttpResponse::Created().json(created))
}

pub async fn list<M, S, T>(Query(page): Query<Pagination>, manager: Data<M>) -> Result<Json<List<PollResult>>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let (polls, total) = poll::list_polls(&mut manager.db().await?, page.into()).await?;
    Ok(Json(List::new(polls, total)))
}

pub async fn detail<M, S, T>(poll_id: Path<(i32,)>, manager: Data<M>) -> Result<Json<PollResult>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = poll::poll_result(&mut manager.db().await?, poll_id.into_inner().0).await?;
    Ok(Json(res))
}

pub async fn update<M, S, T>(user_info: UserInfo, poll_id: Path<(i32,)>, Json(body): Json<PollUpdate>, manager: Data<M>) -> Result<Json<PollResult>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = poll::update_poll(manager.tx().await?, user_info.id, poll_id.into_inner().0, body).await?;
    Ok(Json(res))
}

pub async fn eligibility<M, S, T>(user_info: Option<UserInfo>, poll_id: Path<(i32,)>, manager: Data<M>) -> Result<Json<Eligibility>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = ledger::vote_eligibility(&mut manager.db().await?, poll_id.into_inner().0, user_info.map(|u| u.id)).await?;
    Ok(Json(res))
}

/// Guests may vote on anonymous polls, so the caller is optional here.
pub async fn cast<M, S, T>(user_info: Option<UserInfo>, poll_id: Path<(i32,)>, Json(body): Json<VoteCast>, manager: Data<M>) -> Result<HttpResponse, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = ledger::cast_vote(manager.tx().await?, poll_id.into_inner().0, body.choice_id, user_info.map(|u| u.id)).await?;
    Ok(HttpResponse::Created().json(res))
}

pub async fn retract<M, S, T>(user_info: UserInfo, poll_id: Path<(i32,)>, manager: Data<M>) -> Result<Json<PollResult>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = ledger::retract_vote(manager.tx().await?, poll_id.into_inner().0, user_info.id).await?;
    Ok(Json(res))
}

pub async fn reconcile<M, S, T>(user_info: UserInfo, poll_id: Path<(i32,)>, manager: Data<M>) -> Result<Json<PollResult>, Error>
where
    M: for<'m> Manager<'m, S, T>,
    S: Store,
    T: TxStore,
{
    let res = ledger::reconcile(manager.tx().await?, user_info.id, poll_id.into_inner().0).await?;
    Ok(Json(res))
}
