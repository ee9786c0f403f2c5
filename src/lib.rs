pub mod config;
pub mod context;
pub mod database;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
