use std::collections::{BTreeSet, HashMap, HashSet};

use crate::engine::models::attempt::{AnswerSubmit, TaskResult};
use crate::engine::models::task::{Task, TaskKind, TaskOption};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub score_obtained: i32,
    pub total_score: i32,
    pub results: Vec<TaskResult>,
}

/// Checks that every answer refers to a task of the test, at most once, and
/// only selects options of that task.
pub fn validate_answers(tasks: &[Task], answers: &[AnswerSubmit]) -> Result<(), Error> {
    let by_id: HashMap<i32, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut seen = HashSet::new();
    for answer in answers {
        let task = by_id.get(&answer.task).ok_or(Error::UnknownTask(answer.task))?;
        if !seen.insert(answer.task) {
            return Err(Error::Validation(format!("task {} answered more than once", answer.task)));
        }
        let option_ids: HashSet<i32> = task.options().iter().map(|o| o.id).collect();
        if let Some(stray) = answer.selected_options.iter().find(|id| !option_ids.contains(*id)) {
            return Err(Error::Validation(format!("option {} does not belong to task {}", stray, task.id)));
        }
    }
    Ok(())
}

/// Grades a submission. Every task of the test counts towards the total, answered or not.
pub fn grade(tasks: &[Task], answers: &[AnswerSubmit]) -> Result<Grade, Error> {
    validate_answers(tasks, answers)?;
    let by_task: HashMap<i32, &AnswerSubmit> = answers.iter().map(|a| (a.task, a)).collect();
    let mut total_score = 0;
    let mut score_obtained = 0;
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        total_score = add_score(total_score, task)?;
        let correct = by_task.get(&task.id).map_or(false, |a| is_correct(task, a));
        let awarded = if correct { task.score } else { 0 };
        score_obtained += awarded;
        results.push(TaskResult {
            task_id: task.id,
            awarded,
            correct,
        });
    }
    Ok(Grade {
        score_obtained,
        total_score,
        results,
    })
}

fn add_score(total: i32, task: &Task) -> Result<i32, Error> {
    total
        .checked_add(task.score)
        .ok_or_else(|| Error::ServerError(format!("total score of test {} overflows", task.test_id)))
}

pub fn is_correct(task: &Task, answer: &AnswerSubmit) -> bool {
    let selected: BTreeSet<i32> = answer.selected_options.iter().copied().collect();
    match &task.kind {
        TaskKind::Text { correct_text } => grade_text(correct_text.as_deref(), answer.answer_text.as_deref()),
        TaskKind::Single { options } => grade_single(options, &selected),
        TaskKind::Multiple { options } => grade_multiple(options, &selected),
    }
}

fn grade_text(correct: Option<&str>, submitted: Option<&str>) -> bool {
    match (correct, submitted) {
        (Some(correct), Some(submitted)) => {
            let (correct, submitted) = (correct.trim(), submitted.trim());
            !correct.is_empty() && !submitted.is_empty() && submitted.to_lowercase() == correct.to_lowercase()
        }
        _ => false,
    }
}

fn grade_single(options: &[TaskOption], selected: &BTreeSet<i32>) -> bool {
    if selected.len() != 1 {
        return false;
    }
    options.iter().any(|o| o.is_correct && selected.contains(&o.id))
}

fn grade_multiple(options: &[TaskOption], selected: &BTreeSet<i32>) -> bool {
    let correct: BTreeSet<i32> = options.iter().filter(|o| o.is_correct).map(|o| o.id).collect();
    !correct.is_empty() && &correct == selected
}
