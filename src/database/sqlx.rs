use std::future::Future;
use std::time::Duration;

use log::info;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, query_scalar, Executor, PgPool, Postgres, QueryBuilder, Transaction};

use crate::config::Config;
use crate::engine::models::{
    attempt::{AnswerInsert, Completion, Insert as AttemptInsert, TestAttempt},
    common::{Pagination, UserId},
    poll::{Choice, Insert as PollInsert, Poll, Query as PollQuery, Update as PollUpdate},
    task::{Insert as TaskInsert, OptionInsert as TaskOptionInsert, TaskOption, TaskRow},
    test::{Insert as TestInsert, Test},
    vote::{Insert as VoteInsert, Vote},
};
use crate::engine::ports::repository::{
    AnswerCommon, AttemptCommon, ChoiceCommon, Common, Manager, PollCommon, Store, TaskCommon, TaskOptionCommon, TestCommon, TxStore,
    VoteCommon,
};
use crate::error::Error;

const VOTE_COLUMNS: &str = "id, poll_id, choice_id, voter_id, created_at";
const ATTEMPT_COLUMNS: &str = "id, test_id, user_id, seq, score_obtained, total_score, started_at, completed_at";

/// Bounds a store round trip. Elapsing is reported as `StorageTimeout`, the
/// same as a statement cancelled by the server.
async fn timed<F, T>(limit: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(Error::StorageTimeout),
    }
}

pub struct PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e>,
{
    executor: E,
    timeout: Duration,
}

impl<E> PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e>,
{
    pub fn new(executor: E, timeout: Duration) -> Self {
        Self { executor, timeout }
    }
}

pub struct PgSqlxManager {
    pool: PgPool,
    timeout: Duration,
}

impl PgSqlxManager {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.store_timeout)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool, config.store_timeout))
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    /// Opens a transaction whose statements are cancelled server side once
    /// they run longer than the store timeout.
    pub async fn begin(&self) -> Result<PgSqlx<Transaction<'static, Postgres>>, Error> {
        let mut tx = timed(self.timeout, self.pool.begin()).await?;
        let stmt = format!("SET LOCAL statement_timeout = {}", self.timeout.as_millis());
        timed(self.timeout, query(&stmt).execute(&mut tx)).await?;
        Ok(PgSqlx::new(tx, self.timeout))
    }

    pub async fn acquire(&self) -> Result<PgSqlx<PoolConnection<Postgres>>, Error> {
        let conn = timed(self.timeout, self.pool.acquire()).await?;
        Ok(PgSqlx::new(conn, self.timeout))
    }
}

impl<E> PollCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, data: PollInsert) -> Result<Poll, Error> {
        let stmt = query_as("INSERT INTO polls (title, creator_id, is_anonymous, multiple_answers, end_date) VALUES ($1, $2, $3, $4, $5) RETURNING *")
            .bind(data.title)
            .bind(data.creator_id)
            .bind(data.is_anonymous)
            .bind(data.multiple_answers)
            .bind(data.end_date)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn get(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        timed(self.timeout, query_as("SELECT * FROM polls WHERE id = $1").bind(id).fetch_optional(&mut self.executor)).await
    }

    async fn get_for_share(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        timed(self.timeout, query_as("SELECT * FROM polls WHERE id = $1 FOR SHARE").bind(id).fetch_optional(&mut self.executor)).await
    }

    async fn get_for_update(&mut self, id: i32) -> Result<Option<Poll>, Error> {
        timed(self.timeout, query_as("SELECT * FROM polls WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut self.executor)).await
    }

    async fn update(&mut self, id: i32, data: PollUpdate) -> Result<Poll, Error> {
        let stmt = query_as("UPDATE polls SET active = $1, end_date = $2 WHERE id = $3 RETURNING *")
            .bind(data.active)
            .bind(data.end_date)
            .bind(id)
            .fetch_optional(&mut self.executor);
        timed(self.timeout, stmt).await?.ok_or_else(|| Error::not_found("poll", id))
    }

    async fn query(&mut self, param: &PollQuery, pagination: Pagination) -> Result<Vec<Poll>, Error> {
        let mut stmt = QueryBuilder::<Postgres>::new("SELECT * FROM polls WHERE 1 = 1");
        if let Some(active) = param.active_eq {
            stmt.push(" AND active = ").push_bind(active);
        }
        if let Some(creator_id) = param.creator_id_eq {
            stmt.push(" AND creator_id = ").push_bind(creator_id);
        }
        if let Some(now) = param.open_at {
            stmt.push(" AND (end_date IS NULL OR end_date > ").push_bind(now).push(")");
        }
        stmt.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset);
        timed(self.timeout, stmt.build_query_as().fetch_all(&mut self.executor)).await
    }

    async fn count(&mut self, param: &PollQuery) -> Result<i64, Error> {
        let stmt = query_scalar(
            "
        SELECT COUNT(*)
        FROM polls
        WHERE ($1::BOOLEAN IS NULL OR active = $1)
            AND ($2::INT IS NULL OR creator_id = $2)
            AND ($3::TIMESTAMPTZ IS NULL OR end_date IS NULL OR end_date > $3)",
        )
        .bind(param.active_eq)
        .bind(param.creator_id_eq)
        .bind(param.open_at)
        .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }
}

impl<E> ChoiceCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn bulk_insert(&mut self, poll_id: i32, texts: Vec<String>) -> Result<Vec<Choice>, Error> {
        let mut stmt = QueryBuilder::<Postgres>::new("INSERT INTO choices (poll_id, choice_text) ");
        stmt.push_values(texts, |mut b, text| {
            b.push_bind(poll_id).push_bind(text);
        });
        stmt.push(" RETURNING *");
        let mut choices: Vec<Choice> = timed(self.timeout, stmt.build_query_as().fetch_all(&mut self.executor)).await?;
        choices.sort_by_key(|c| c.id);
        Ok(choices)
    }

    async fn query(&mut self, poll_id: i32) -> Result<Vec<Choice>, Error> {
        timed(self.timeout, query_as("SELECT * FROM choices WHERE poll_id = $1 ORDER BY id").bind(poll_id).fetch_all(&mut self.executor)).await
    }

    async fn get_in_poll(&mut self, poll_id: i32, id: i32) -> Result<Option<Choice>, Error> {
        let stmt = query_as("SELECT * FROM choices WHERE id = $1 AND poll_id = $2")
            .bind(id)
            .bind(poll_id)
            .fetch_optional(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn increment(&mut self, id: i32) -> Result<(), Error> {
        let res = timed(self.timeout, query("UPDATE choices SET votes_count = votes_count + 1 WHERE id = $1").bind(id).execute(&mut self.executor)).await?;
        if res.rows_affected() == 0 {
            return Err(Error::not_found("choice", id));
        }
        Ok(())
    }

    async fn decrement(&mut self, id: i32) -> Result<bool, Error> {
        let stmt = query("UPDATE choices SET votes_count = votes_count - 1 WHERE id = $1 AND votes_count > 0")
            .bind(id)
            .execute(&mut self.executor);
        Ok(timed(self.timeout, stmt).await?.rows_affected() == 1)
    }

    async fn recount(&mut self, poll_id: i32) -> Result<u64, Error> {
        let stmt = query(
            "
        UPDATE choices AS c
        SET votes_count = live.n
        FROM (
            SELECT ch.id, COUNT(v.id)::INT AS n
            FROM choices AS ch
            LEFT JOIN votes AS v ON v.choice_id = ch.id
            WHERE ch.poll_id = $1
            GROUP BY ch.id
        ) AS live
        WHERE c.id = live.id AND c.votes_count <> live.n",
        )
        .bind(poll_id)
        .execute(&mut self.executor);
        Ok(timed(self.timeout, stmt).await?.rows_affected())
    }
}

impl<E> VoteCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, data: VoteInsert) -> Result<Vote, Error> {
        let sql = format!("INSERT INTO votes (poll_id, choice_id, voter_id, single_answer) VALUES ($1, $2, $3, $4) RETURNING {}", VOTE_COLUMNS);
        let stmt = query_as(&sql)
            .bind(data.poll_id)
            .bind(data.choice_id)
            .bind(data.voter_id)
            .bind(data.single_answer)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn exists(&mut self, poll_id: i32, voter_id: UserId) -> Result<bool, Error> {
        let stmt = query_scalar("SELECT EXISTS(SELECT 1 FROM votes WHERE poll_id = $1 AND voter_id = $2)")
            .bind(poll_id)
            .bind(voter_id)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn query_for_update(&mut self, poll_id: i32, voter_id: UserId) -> Result<Vec<Vote>, Error> {
        let sql = format!("SELECT {} FROM votes WHERE poll_id = $1 AND voter_id = $2 ORDER BY id FOR UPDATE", VOTE_COLUMNS);
        let stmt = query_as(&sql).bind(poll_id).bind(voter_id).fetch_all(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn delete(&mut self, ids: &[i32]) -> Result<u64, Error> {
        let stmt = query("DELETE FROM votes WHERE id = ANY($1)").bind(ids.to_vec()).execute(&mut self.executor);
        Ok(timed(self.timeout, stmt).await?.rows_affected())
    }

    async fn count(&mut self, poll_id: i32) -> Result<i64, Error> {
        timed(self.timeout, query_scalar("SELECT COUNT(*) FROM votes WHERE poll_id = $1").bind(poll_id).fetch_one(&mut self.executor)).await
    }
}

impl<E> TestCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, data: TestInsert) -> Result<Test, Error> {
        let stmt = query_as("INSERT INTO tests (title, owner_id, completion_time, attempt_number, end_date) VALUES ($1, $2, $3, $4, $5) RETURNING *")
            .bind(data.title)
            .bind(data.owner_id)
            .bind(data.completion_time)
            .bind(data.attempt_number)
            .bind(data.end_date)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn get(&mut self, id: i32) -> Result<Option<Test>, Error> {
        timed(self.timeout, query_as("SELECT * FROM tests WHERE id = $1").bind(id).fetch_optional(&mut self.executor)).await
    }

    async fn get_for_update(&mut self, id: i32) -> Result<Option<Test>, Error> {
        timed(self.timeout, query_as("SELECT * FROM tests WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut self.executor)).await
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        let res = timed(self.timeout, query("DELETE FROM tests WHERE id = $1").bind(id).execute(&mut self.executor)).await?;
        if res.rows_affected() == 0 {
            return Err(Error::not_found("test", id));
        }
        Ok(())
    }
}

impl<E> TaskCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, task: TaskInsert) -> Result<i32, Error> {
        let stmt = query_scalar("INSERT INTO tasks (test_id, question, task_type, score, correct_text, position) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id")
            .bind(task.test_id)
            .bind(task.question)
            .bind(task.task_type)
            .bind(task.score)
            .bind(task.correct_text)
            .bind(task.position)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskRow>, Error> {
        let stmt = query_as("SELECT * FROM tasks WHERE test_id = $1 ORDER BY position, id").bind(test_id).fetch_all(&mut self.executor);
        timed(self.timeout, stmt).await
    }
}

impl<E> TaskOptionCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, option: TaskOptionInsert) -> Result<i32, Error> {
        let stmt = query_scalar("INSERT INTO task_options (task_id, text, is_correct) VALUES ($1, $2, $3) RETURNING id")
            .bind(option.task_id)
            .bind(option.text)
            .bind(option.is_correct)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn query(&mut self, test_id: i32) -> Result<Vec<TaskOption>, Error> {
        let stmt = query_as(
            "
        SELECT o.*
        FROM task_options AS o
        JOIN tasks AS t ON t.id = o.task_id
        WHERE t.test_id = $1
        ORDER BY o.id",
        )
        .bind(test_id)
        .fetch_all(&mut self.executor);
        timed(self.timeout, stmt).await
    }
}

impl<E> AttemptCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, attempt: AttemptInsert) -> Result<TestAttempt, Error> {
        let sql = format!(
            "INSERT INTO test_attempts (test_id, user_id, seq, attempt_limit, started_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ATTEMPT_COLUMNS
        );
        let stmt = query_as(&sql)
            .bind(attempt.test_id)
            .bind(attempt.user_id)
            .bind(attempt.seq)
            .bind(attempt.attempt_limit)
            .bind(attempt.started_at)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn count(&mut self, test_id: i32, user_id: UserId) -> Result<i64, Error> {
        let stmt = query_scalar("SELECT COUNT(*) FROM test_attempts WHERE test_id = $1 AND user_id = $2")
            .bind(test_id)
            .bind(user_id)
            .fetch_one(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn complete(&mut self, id: i32, completion: Completion) -> Result<Option<TestAttempt>, Error> {
        let sql = format!(
            "UPDATE test_attempts SET score_obtained = $1, total_score = $2, completed_at = $3 WHERE id = $4 AND completed_at IS NULL RETURNING {}",
            ATTEMPT_COLUMNS
        );
        let stmt = query_as(&sql)
            .bind(completion.score_obtained)
            .bind(completion.total_score)
            .bind(completion.completed_at)
            .bind(id)
            .fetch_optional(&mut self.executor);
        timed(self.timeout, stmt).await
    }

    async fn query(&mut self, test_id: i32, user_id: UserId) -> Result<Vec<TestAttempt>, Error> {
        let sql = format!("SELECT {} FROM test_attempts WHERE test_id = $1 AND user_id = $2 ORDER BY id", ATTEMPT_COLUMNS);
        let stmt = query_as(&sql).bind(test_id).bind(user_id).fetch_all(&mut self.executor);
        timed(self.timeout, stmt).await
    }
}

impl<E> AnswerCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, answer: AnswerInsert) -> Result<i32, Error> {
        let stmt = query_scalar("INSERT INTO task_answers (attempt_id, task_id, answer_text) VALUES ($1, $2, $3) RETURNING id")
            .bind(answer.attempt_id)
            .bind(answer.task_id)
            .bind(answer.answer_text)
            .fetch_one(&mut self.executor);
        let id: i32 = timed(self.timeout, stmt).await?;
        if !answer.selected_options.is_empty() {
            let stmt = query("INSERT INTO task_answer_options (answer_id, option_id) SELECT $1, UNNEST($2::INT[])")
                .bind(id)
                .bind(answer.selected_options)
                .execute(&mut self.executor);
            timed(self.timeout, stmt).await?;
        }
        Ok(id)
    }
}

impl<E> Common for PgSqlx<E> where for<'e> &'e mut E: Executor<'e, Database = Postgres> {}

impl Store for PgSqlx<PoolConnection<Postgres>> {}
impl<'a> Store for PgSqlx<Transaction<'a, Postgres>> {}

impl<'a> TxStore for PgSqlx<Transaction<'a, Postgres>> {
    async fn commit(self) -> Result<(), Error> {
        timed(self.timeout, self.executor.commit()).await
    }

    async fn rollback(self) -> Result<(), Error> {
        timed(self.timeout, self.executor.rollback()).await
    }
}

impl<'a> Manager<'a, PgSqlx<PoolConnection<Postgres>>, PgSqlx<Transaction<'static, Postgres>>> for PgSqlxManager {
    async fn db(&'a self) -> Result<PgSqlx<PoolConnection<Postgres>>, Error> {
        self.acquire().await
    }

    async fn tx(&'a self) -> Result<PgSqlx<Transaction<'static, Postgres>>, Error> {
        self.begin().await
    }
}
