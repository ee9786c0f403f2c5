//! In-memory store used by the engine tests. A transaction holds the whole
//! state exclusively and restores a snapshot unless it is committed, which
//! gives the same all-or-nothing behaviour as a database transaction. The
//! constraints the schema enforces are checked here as well and reported
//! through the same constraint names.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::engine::models::{
    attempt::{AnswerInsert, Completion, Insert as AttemptInsert, TestAttempt},
    common::{Pagination, UserId},
    poll::{Choice, ChoiceCreate, Insert as PollInsert, Poll, PollCreate, Query as PollQuery, Update as PollUpdate},
    task::{Insert as TaskInsert, OptionCreate, OptionInsert as TaskOptionInsert, TaskCreate, TaskOption, TaskRow, TaskType},
    test::{Insert as TestInsert, Test, TestCreate},
    vote::{Insert as VoteInsert, Vote},
};
use crate::engine::ports::repository::{
    AnswerCommon, AttemptCommon, ChoiceCommon, Common, Manager, PollCommon, Store, TaskCommon, TaskOptionCommon, TestCommon, TxStore,
    VoteCommon,
};
use crate::error::{self, Error};

#[derive(Clone)]
struct VoteRow {
    vote: Vote,
    single_answer: bool,
}

#[derive(Clone, Default)]
struct State {
    polls: BTreeMap<i32, Poll>,
    choices: BTreeMap<i32, Choice>,
    votes: BTreeMap<i32, VoteRow>,
    tests: BTreeMap<i32, Test>,
    tasks: BTreeMap<i32, TaskRow>,
    options: BTreeMap<i32, TaskOption>,
    attempts: BTreeMap<i32, TestAttempt>,
    answers: BTreeMap<i32, AnswerInsert>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn live_votes(&self, choice_id: i32) -> usize {
        self.votes.values().filter(|v| v.vote.choice_id == choice_id).count()
    }
}

fn violated(constraint: &str) -> Error {
    Error::from_constraint(constraint).unwrap_or_else(|| Error::ServerError(format!("constraint {} violated", constraint)))
}

#[derive(Clone, Default)]
pub struct MemManager {
    state: Arc<Mutex<State>>,
}

impl MemManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vote rows referencing the choice, bypassing the cached counter.
    pub async fn votes_for_choice(&self, choice_id: i32) -> usize {
        self.state.lock().await.live_votes(choice_id)
    }

    /// Forces a counter out of sync with the vote rows.
    pub async fn set_votes_count(&self, choice_id: i32, count: i32) {
        if let Some(c) = self.state.lock().await.choices.get_mut(&choice_id) {
            c.votes_count = count;
        }
    }

    pub async fn answer_count(&self, attempt_id: i32) -> usize {
        self.state.lock().await.answers.values().filter(|a| a.attempt_id == attempt_id).count()
    }
}

pub struct MemStore {
    guard: OwnedMutexGuard<State>,
    snapshot: Option<State>,
    stale_vote_reads: bool,
}

impl MemStore {
    /// Makes `VoteCommon::exists` answer as if it ran before a concurrent
    /// vote committed, leaving only the constraints to catch the duplicate.
    pub fn with_stale_vote_reads(mut self) -> Self {
        self.stale_vote_reads = true;
        self
    }
}

impl Drop for MemStore {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

impl<'m> Manager<'m, MemStore, MemStore> for MemManager {
    async fn db(&'m self) -> Result<MemStore, Error> {
        Ok(MemStore {
            guard: self.state.clone().lock_owned().await,
            snapshot: None,
            stale_vote_reads: false,
        })
    }

    async fn tx(&'m self) -> Result<MemStore, Error> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(State::clone(&guard));
        Ok(MemStore {
            guard,
            snapshot,
            stale_vote_reads: false,
        })
    }
}

impl PollCommon for MemStore {
    async fn insert(&mut self, data: PollInsert) -> Result<Poll, Error> {
        let id = self.guard.next_id();
        let poll = Poll {
            id,
            title: data.title,
            creator_id: data.creator_id,
            is_anonymous: data.is_anonymous,
            multiple_answers: data.multiple_answers,
            active: true,
            created_at: Utc::now(),
            end_date: data.end_date,
        };
        self.guard.polls.insert(id, poll.clone());
        Ok(poll)
    }

    async fn get(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        Ok(self.guard.polls.get(&id).cloned())
    }

    async fn get_for_share(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        PollCommon::get(self, id).await
    }

    async fn get_for_update(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        PollCommon::get(self, id).await
    }

    async fn update(&mut self, id: i32, data: PollUpdate) -> Result<Poll, Error> {
        let poll = self.guard.polls.get_mut(&id).ok_or_else(|| Error::not_found("poll", id))?;
        poll.active = data.active;
        poll.end_date = data.end_date;
        Ok(poll.clone())
    }

    async fn query(&mut self, query: &PollQuery, pagination: Pagination) -> Result<Vec<Poll>, Error> {
        let mut polls: Vec<Poll> = self.guard.polls.values().filter(|p| matches_query(p, query)).cloned().collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(polls.into_iter().skip(pagination.offset as usize).take(pagination.limit as usize).collect())
    }

    async fn count(&mut self, query: &PollQuery) -> Result<i64, Error> {
        Ok(self.guard.polls.values().filter(|p| matches_query(p, query)).count() as i64)
    }
}

fn matches_query(poll: &Poll, query: &PollQuery) -> bool {
    query.active_eq.map_or(true, |a| poll.active == a)
        && query.creator_id_eq.map_or(true, |c| poll.creator_id == c)
        && query.open_at.map_or(true, |now| !poll.is_past_end(now))
}

impl ChoiceCommon for MemStore {
    async fn bulk_insert(&mut self, poll_id: i32, texts: Vec<String>) -> Result<Vec<Choice>, Error> {
        if !self.guard.polls.contains_key(&poll_id) {
            return Err(Error::not_found("poll", poll_id));
        }
        let mut created = Vec::with_capacity(texts.len());
        for choice_text in texts {
            let id = self.guard.next_id();
            let choice = Choice {
                id,
                poll_id,
                choice_text,
                votes_count: 0,
            };
            self.guard.choices.insert(id, choice.clone());
            created.push(choice);
        }
        Ok(created)
    }

    async fn query(&mut self, poll_id: i32) -> Result<Vec<Choice>, Error> {
        Ok(self.guard.choices.values().filter(|c| c.poll_id == poll_id).cloned().collect())
    }

    async fn get_in_poll(&mut self, poll_id: i32, id: i32) -> Result<Option<Choice>, Error> {
        Ok(self.guard.choices.get(&id).filter(|c| c.poll_id == poll_id).cloned())
    }

    async fn increment(&mut self, id: i32) -> Result<(), Error> {
        let choice = self.guard.choices.get_mut(&id).ok_or_else(|| Error::not_found("choice", id))?;
        choice.votes_count += 1;
        Ok(())
    }

    async fn decrement(&mut self, id: i32) -> Result<bool, Error> {
        match self.guard.choices.get_mut(&id) {
            Some(c) if c.votes_count > 0 => {
                c.votes_count -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recount(&mut self, poll_id: i32) -> Result<u64, Error> {
        let state = &mut *self.guard;
        let live: Vec<(i32, i32)> = state
            .choices
            .values()
            .filter(|c| c.poll_id == poll_id)
            .map(|c| (c.id, state.live_votes(c.id) as i32))
            .collect();
        let mut fixed = 0;
        for (id, count) in live {
            if let Some(c) = state.choices.get_mut(&id) {
                if c.votes_count != count {
                    c.votes_count = count;
                    fixed += 1;
                }
            }
        }
        Ok(fixed)
    }
}

impl VoteCommon for MemStore {
    async fn insert(&mut self, data: VoteInsert) -> Result<Vote, Error> {
        let state = &mut *self.guard;
        if !state.choices.get(&data.choice_id).map_or(false, |c| c.poll_id == data.poll_id) {
            return Err(violated(error::VOTES_CHOICE_IN_POLL_FKEY));
        }
        if data.single_answer && data.voter_id.is_some() {
            let taken = state
                .votes
                .values()
                .any(|v| v.single_answer && v.vote.poll_id == data.poll_id && v.vote.voter_id == data.voter_id);
            if taken {
                return Err(violated(error::VOTES_SINGLE_ANSWER_KEY));
            }
        }
        let id = state.next_id();
        let vote = Vote {
            id,
            poll_id: data.poll_id,
            choice_id: data.choice_id,
            voter_id: data.voter_id,
            created_at: Utc::now(),
        };
        state.votes.insert(
            id,
            VoteRow {
                vote: vote.clone(),
                single_answer: data.single_answer,
            },
        );
        Ok(vote)
    }

    async fn exists(&mut self, poll_id: i32, voter_id: UserId) -> Result<bool, Error> {
        if self.stale_vote_reads {
            return Ok(false);
        }
        Ok(self.guard.votes.values().any(|v| v.vote.poll_id == poll_id && v.vote.voter_id == Some(voter_id)))
    }

    async fn query_for_update(&mut self, poll_id: i32, voter_id: UserId) -> Result<Vec<Vote>, Error> {
        Ok(self
            .guard
            .votes
            .values()
            .filter(|v| v.vote.poll_id == poll_id && v.vote.voter_id == Some(voter_id))
            .map(|v| v.vote.clone())
            .collect())
    }

    async fn delete(&mut self, ids: &[i32]) -> Result<u64, Error> {
        Ok(ids.iter().filter(|id| self.guard.votes.remove(*id).is_some()).count() as u64)
    }

    async fn count(&mut self, poll_id: i32) -> Result<i64, Error> {
        Ok(self.guard.votes.values().filter(|v| v.vote.poll_id == poll_id).count() as i64)
    }
}

impl TestCommon for MemStore {
    async fn insert(&mut self, data: TestInsert) -> Result<Test, Error> {
        let id = self.guard.next_id();
        let test = Test {
            id,
            title: data.title,
            owner_id: data.owner_id,
            completion_time: data.completion_time,
            attempt_number: data.attempt_number,
            end_date: data.end_date,
            created_at: Utc::now(),
        };
        self.guard.tests.insert(id, test.clone());
        Ok(test)
    }

    async fn get(&mut self, id: i32) -> Result<Option<Test>, Error> {
        Ok(self.guard.tests.get(&id).cloned())
    }

    async fn get_for_update(&mut self, id: i32) -> Result<Option<Test>, Error> {
        TestCommon::get(self, id).await
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        let state = &mut *self.guard;
        if state.tests.remove(&id).is_none() {
            return Err(Error::not_found("test", id));
        }
        state.tasks.retain(|_, t| t.test_id != id);
        let tasks = &state.tasks;
        state.options.retain(|_, o| tasks.contains_key(&o.task_id));
        state.attempts.retain(|_, a| a.test_id != id);
        let attempts = &state.attempts;
        state.answers.retain(|_, a| attempts.contains_key(&a.attempt_id));
        Ok(())
    }
}

impl TaskCommon for MemStore {
    async fn insert(&mut self, task: TaskInsert) -> Result<i32, Error> {
        if !self.guard.tests.contains_key(&task.test_id) {
            return Err(Error::not_found("test", task.test_id));
        }
        let id = self.guard.next_id();
        self.guard.tasks.insert(
            id,
            TaskRow {
                id,
                test_id: task.test_id,
                question: task.question,
                task_type: task.task_type,
                score: task.score,
                correct_text: task.correct_text,
                position: task.position,
            },
        );
        Ok(id)
    }

    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskRow>, Error> {
        let mut rows: Vec<TaskRow> = self.guard.tasks.values().filter(|t| t.test_id == test_id).cloned().collect();
        rows.sort_by_key(|t| (t.position, t.id));
        Ok(rows)
    }
}

impl TaskOptionCommon for MemStore {
    async fn insert(&mut self, option: TaskOptionInsert) -> Result<i32, Error> {
        if !self.guard.tasks.contains_key(&option.task_id) {
            return Err(Error::not_found("task", option.task_id));
        }
        let id = self.guard.next_id();
        self.guard.options.insert(
            id,
            TaskOption {
                id,
                task_id: option.task_id,
                text: option.text,
                is_correct: option.is_correct,
            },
        );
        Ok(id)
    }

    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskOption>, Error> {
        let state = &*self.guard;
        Ok(state
            .options
            .values()
            .filter(|o| state.tasks.get(&o.task_id).map_or(false, |t| t.test_id == test_id))
            .cloned()
            .collect())
    }
}

impl AttemptCommon for MemStore {
    async fn insert(&mut self, attempt: AttemptInsert) -> Result<TestAttempt, Error> {
        let state = &mut *self.guard;
        if !state.tests.contains_key(&attempt.test_id) {
            return Err(Error::not_found("test", attempt.test_id));
        }
        if let Some(seq) = attempt.seq {
            if seq > attempt.attempt_limit {
                return Err(violated(error::TEST_ATTEMPTS_SEQ_WITHIN_LIMIT));
            }
            let taken = state
                .attempts
                .values()
                .any(|a| a.test_id == attempt.test_id && a.user_id == attempt.user_id && a.seq == Some(seq));
            if taken {
                return Err(violated(error::TEST_ATTEMPTS_SEQ_KEY));
            }
        }
        let id = state.next_id();
        let row = TestAttempt {
            id,
            test_id: attempt.test_id,
            user_id: attempt.user_id,
            seq: attempt.seq,
            score_obtained: 0,
            total_score: 0,
            started_at: attempt.started_at,
            completed_at: None,
        };
        state.attempts.insert(id, row.clone());
        Ok(row)
    }

    async fn count(&mut self, test_id: i32, user_id: UserId) -> Result<i64, Error> {
        Ok(self
            .guard
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.user_id == Some(user_id))
            .count() as i64)
    }

    async fn complete(&mut self, id: i32, completion: Completion) -> Result<Option<TestAttempt>, Error> {
        match self.guard.attempts.get_mut(&id) {
            Some(row) if row.completed_at.is_none() => {
                row.score_obtained = completion.score_obtained;
                row.total_score = completion.total_score;
                row.completed_at = Some(completion.completed_at);
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn query(&mut self, test_id: i32, user_id: UserId) -> Result<Vec<TestAttempt>, Error> {
        Ok(self
            .guard
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.user_id == Some(user_id))
            .cloned()
            .collect())
    }
}

impl AnswerCommon for MemStore {
    async fn insert(&mut self, answer: AnswerInsert) -> Result<i32, Error> {
        let state = &mut *self.guard;
        if !state.attempts.contains_key(&answer.attempt_id) {
            return Err(Error::not_found("attempt", answer.attempt_id));
        }
        if let Some(stray) = answer.selected_options.iter().find(|o| !state.options.contains_key(*o)) {
            return Err(Error::not_found("option", *stray));
        }
        let id = state.next_id();
        state.answers.insert(id, answer);
        Ok(id)
    }
}

impl Common for MemStore {}

impl Store for MemStore {}

impl TxStore for MemStore {
    async fn commit(mut self) -> Result<(), Error> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        Ok(())
    }
}

pub fn new_poll(texts: &[&str], multiple_answers: bool, is_anonymous: bool) -> PollCreate {
    PollCreate {
        title: "lunch".into(),
        is_anonymous,
        multiple_answers,
        end_date: None,
        choices: texts
            .iter()
            .map(|t| ChoiceCreate {
                choice_text: t.to_string(),
            })
            .collect(),
    }
}

fn option(text: &str, is_correct: bool) -> OptionCreate {
    OptionCreate {
        text: text.into(),
        is_correct,
    }
}

/// Three tasks worth 5, 3 and 4 points: a text question answered by "Paris",
/// a single choice whose first option is correct and a multiple choice whose
/// first two options are correct.
pub fn new_test(attempt_number: i32) -> TestCreate {
    TestCreate {
        title: "geography".into(),
        completion_time: Some(10),
        attempt_number,
        end_date: None,
        tasks: vec![
            TaskCreate {
                question: "Capital of France?".into(),
                task_type: TaskType::Text,
                score: 5,
                correct_text: Some("Paris".into()),
                options: vec![],
            },
            TaskCreate {
                question: "Largest ocean?".into(),
                task_type: TaskType::Single,
                score: 3,
                correct_text: None,
                options: vec![option("Pacific", true), option("Atlantic", false)],
            },
            TaskCreate {
                question: "Which are in Europe?".into(),
                task_type: TaskType::Multiple,
                score: 4,
                correct_text: None,
                options: vec![option("Spain", true), option("Norway", true), option("Peru", false)],
            },
        ],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_transaction_is_rolled_back() {
        let m = MemManager::new();
        let mut tx = m.tx().await.unwrap();
        let poll = PollCommon::insert(
            &mut tx,
            PollInsert {
                title: "t".into(),
                creator_id: 1,
                is_anonymous: false,
                multiple_answers: false,
                end_date: None,
            },
        )
        .await
        .unwrap();
        drop(tx);
        assert!(PollCommon::get(&mut m.db().await.unwrap(), poll.id).await.unwrap().is_none());

        let mut tx = m.tx().await.unwrap();
        let poll = PollCommon::insert(
            &mut tx,
            PollInsert {
                title: "t".into(),
                creator_id: 1,
                is_anonymous: false,
                multiple_answers: false,
                end_date: None,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert!(PollCommon::get(&mut m.db().await.unwrap(), poll.id).await.unwrap().is_some());
    }
}
