use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Text,
    Single,
    Multiple,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Text => "text",
            TaskType::Single => "single",
            TaskType::Multiple => "multiple",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(TaskType::Text),
            "single" => Ok(TaskType::Single),
            "multiple" => Ok(TaskType::Multiple),
            other => Err(Error::ServerError(format!("unknown task type {}", other))),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: i32,
    pub test_id: i32,
    pub question: String,
    pub task_type: String,
    pub score: i32,
    pub correct_text: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaskOption {
    pub id: i32,
    pub task_id: i32,
    pub text: String,
    pub is_correct: bool,
}

/// How a task is answered and what counts as the correct answer.
#[derive(Debug, Clone)]
pub enum TaskKind {
    Text { correct_text: Option<String> },
    Single { options: Vec<TaskOption> },
    Multiple { options: Vec<TaskOption> },
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: i32,
    pub test_id: i32,
    pub question: String,
    pub score: i32,
    pub order: i32,
    pub kind: TaskKind,
}

impl Task {
    pub fn assemble(row: TaskRow, options: Vec<TaskOption>) -> Result<Self, Error> {
        let kind = match row.task_type.parse()? {
            TaskType::Text => TaskKind::Text { correct_text: row.correct_text },
            TaskType::Single => TaskKind::Single { options },
            TaskType::Multiple => TaskKind::Multiple { options },
        };
        Ok(Self {
            id: row.id,
            test_id: row.test_id,
            question: row.question,
            score: row.score,
            order: row.position,
            kind,
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self.kind {
            TaskKind::Text { .. } => TaskType::Text,
            TaskKind::Single { .. } => TaskType::Single,
            TaskKind::Multiple { .. } => TaskType::Multiple,
        }
    }

    pub fn options(&self) -> &[TaskOption] {
        match &self.kind {
            TaskKind::Text { .. } => &[],
            TaskKind::Single { options } | TaskKind::Multiple { options } => options,
        }
    }

    /// Read-only rendering. Answers stay hidden unless `reveal` is set.
    pub fn view(&self, reveal: bool) -> TaskView {
        let correct_text = match &self.kind {
            TaskKind::Text { correct_text } if reveal => correct_text.clone(),
            _ => None,
        };
        TaskView {
            id: self.id,
            question: self.question.clone(),
            task_type: self.task_type(),
            score: self.score,
            order: self.order,
            correct_text,
            options: self
                .options()
                .iter()
                .map(|o| OptionView {
                    id: o.id,
                    text: o.text.clone(),
                    is_correct: reveal.then_some(o.is_correct),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub id: i32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: i32,
    pub question: String,
    pub task_type: TaskType,
    pub score: i32,
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_text: Option<String>,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionCreate {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreate {
    pub question: String,
    #[serde(alias = "type")]
    pub task_type: TaskType,
    #[serde(default = "default_score")]
    pub score: i32,
    pub correct_text: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionCreate>,
}

fn default_score() -> i32 {
    1
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub test_id: i32,
    pub question: String,
    pub task_type: String,
    pub score: i32,
    pub correct_text: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct OptionInsert {
    pub task_id: i32,
    pub text: String,
    pub is_correct: bool,
}
