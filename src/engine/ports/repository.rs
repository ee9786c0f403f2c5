use crate::engine::models::{
    attempt::{AnswerInsert, Completion, Insert as AttemptInsert, TestAttempt},
    common::{Pagination, UserId},
    poll::{Choice, Insert as PollInsert, Poll, Query as PollQuery, Update as PollUpdate},
    task::{Insert as TaskInsert, OptionInsert as TaskOptionInsert, TaskOption, TaskRow},
    test::{Insert as TestInsert, Test},
    vote::{Insert as VoteInsert, Vote},
};
use crate::error::Error;

pub trait PollCommon {
    async fn insert(&mut self, data: PollInsert) -> Result<Poll, Error>;
    async fn get(&mut self, id: i32) -> Result<Option<Poll>, Error>;
    /// Shared row lock: settings can not change while votes are being applied.
    async fn get_for_share(&mut self, id: i32) -> Result<Option<Poll>, Error>;
    async fn get_for_update(&mut self, id: i32) -> Result<Option<Poll>, Error>;
    async fn update(&mut self, id: i32, data: PollUpdate) -> Result<Poll, Error>;
    async fn query(&mut self, query: &PollQuery, pagination: Pagination) -> Result<Vec<Poll>, Error>;
    async fn count(&mut self, query: &PollQuery) -> Result<i64, Error>;
}

pub trait ChoiceCommon {
    async fn bulk_insert(&mut self, poll_id: i32, texts: Vec<String>) -> Result<Vec<Choice>, Error>;
    async fn query(&mut self, poll_id: i32) -> Result<Vec<Choice>, Error>;
    async fn get_in_poll(&mut self, poll_id: i32, id: i32) -> Result<Option<Choice>, Error>;
    /// Single statement `votes_count + 1`.
    async fn increment(&mut self, id: i32) -> Result<(), Error>;
    /// Single statement `votes_count - 1`, refused when the counter is already zero.
    /// Returns whether a row was decremented.
    async fn decrement(&mut self, id: i32) -> Result<bool, Error>;
    /// Recomputes every counter of the poll from its vote rows. Returns how many counters changed.
    async fn recount(&mut self, poll_id: i32) -> Result<u64, Error>;
}

pub trait VoteCommon {
    async fn insert(&mut self, data: VoteInsert) -> Result<Vote, Error>;
    async fn exists(&mut self, poll_id: i32, voter_id: UserId) -> Result<bool, Error>;
    /// The voter's votes in the poll, locked until the transaction ends.
    async fn query_for_update(&mut self, poll_id: i32, voter_id: UserId) -> Result<Vec<Vote>, Error>;
    async fn delete(&mut self, ids: &[i32]) -> Result<u64, Error>;
    async fn count(&mut self, poll_id: i32) -> Result<i64, Error>;
}

pub trait TestCommon {
    async fn insert(&mut self, data: TestInsert) -> Result<Test, Error>;
    async fn get(&mut self, id: i32) -> Result<Option<Test>, Error>;
    async fn get_for_update(&mut self, id: i32) -> Result<Option<Test>, Error>;
    async fn delete(&mut self, id: i32) -> Result<(), Error>;
}

pub trait TaskCommon {
    async fn insert(&mut self, task: TaskInsert) -> Result<i32, Error>;
    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskRow>, Error>;
}

pub trait TaskOptionCommon {
    async fn insert(&mut self, option: TaskOptionInsert) -> Result<i32, Error>;
    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskOption>, Error>;
}

pub trait AttemptCommon {
    async fn insert(&mut self, attempt: AttemptInsert) -> Result<TestAttempt, Error>;
    async fn count(&mut self, test_id: i32, user_id: UserId) -> Result<i64, Error>;
    /// Stamps an open attempt as graded. Returns `None` if the attempt was already completed.
    async fn complete(&mut self, id: i32, completion: Completion) -> Result<Option<TestAttempt>, Error>;
    async fn query(&mut self, test_id: i32, user_id: UserId) -> Result<Vec<TestAttempt>, Error>;
}

pub trait AnswerCommon {
    async fn insert(&mut self, answer: AnswerInsert) -> Result<i32, Error>;
}

pub trait Common: PollCommon + ChoiceCommon + VoteCommon + TestCommon + TaskCommon + TaskOptionCommon + AttemptCommon + AnswerCommon {}

pub trait Store: Common {}

pub trait TxStore: Store {
    async fn commit(self) -> Result<(), Error>;
    async fn rollback(self) -> Result<(), Error>;
}

pub trait Manager<'m, S, T>
where
    S: Store,
    T: TxStore,
{
    async fn db(&'m self) -> Result<S, Error>;
    async fn tx(&'m self) -> Result<T, Error>;
}
