pub mod app;
pub mod auth;
pub mod challenges;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod levels;
pub mod memory;
pub mod response;
pub mod state;
pub mod subscriptions;
pub mod users;
pub mod verification;
