pub mod attempt;
pub mod common;
pub mod poll;
pub mod task;
pub mod vote;
