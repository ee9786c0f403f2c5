use chrono::Utc;
use itertools::Itertools;
use log::{info, warn};

use crate::engine::grading;
use crate::engine::guard;
use crate::engine::models::{
    attempt::{AnswerInsert, AnswerSubmit, Completion, GradedAttempt, Insert as AttemptInsert, TestAttempt},
    common::UserId,
};
use crate::engine::ports::repository::{AnswerCommon, AttemptCommon, Store, TestCommon, TxStore};
use crate::engine::services::test::load_tasks;
use crate::error::Error;

/// Records and grades one attempt. The test row stays locked for the whole
/// transaction so attempts of the same test are counted one at a time.
pub async fn submit_attempt<T>(mut storer: T, test_id: i32, user: Option<UserId>, answers: Vec<AnswerSubmit>) -> Result<GradedAttempt, Error>
where
    T: TxStore,
{
    let test = TestCommon::get_for_update(&mut storer, test_id).await?.ok_or_else(|| Error::not_found("test", test_id))?;
    let existing = match user {
        Some(uid) => AttemptCommon::count(&mut storer, test_id, uid).await?,
        None => 0,
    };
    let started_at = Utc::now();
    if let Err(e) = guard::check_submit_attempt(&test, user, existing, started_at) {
        warn!("attempt on test {} by {:?} refused: {}", test_id, user, e);
        return Err(e);
    }
    let tasks = load_tasks(&mut storer, test_id).await?;
    let grade = grading::grade(&tasks, &answers)?;
    let attempt = AttemptCommon::insert(
        &mut storer,
        AttemptInsert {
            test_id,
            user_id: user,
            seq: user.map(|_| existing as i32 + 1),
            attempt_limit: test.attempt_number,
            started_at,
        },
    )
    .await?;
    for answer in answers {
        AnswerCommon::insert(
            &mut storer,
            AnswerInsert {
                attempt_id: attempt.id,
                task_id: answer.task,
                answer_text: answer.answer_text,
                selected_options: answer.selected_options.into_iter().unique().collect(),
            },
        )
        .await?;
    }
    let attempt = AttemptCommon::complete(
        &mut storer,
        attempt.id,
        Completion {
            score_obtained: grade.score_obtained,
            total_score: grade.total_score,
            completed_at: Utc::now(),
        },
    )
    .await?
    .ok_or_else(|| Error::ServerError(format!("attempt {} was graded twice", attempt.id)))?;
    storer.commit().await?;
    info!(
        "attempt {} on test {} by {:?} graded {}/{}",
        attempt.id, test_id, user, attempt.score_obtained, attempt.total_score
    );
    Ok(GradedAttempt {
        attempt,
        results: grade.results,
    })
}

pub async fn list_attempts<S>(storer: &mut S, test_id: i32, user: UserId) -> Result<Vec<TestAttempt>, Error>
where
    S: Store,
{
    if TestCommon::get(storer, test_id).await?.is_none() {
        return Err(Error::not_found("test", test_id));
    }
    AttemptCommon::query(storer, test_id, user).await
}
