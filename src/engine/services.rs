pub mod attempt;
pub mod ledger;
pub mod poll;
