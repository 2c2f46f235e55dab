use axum::Router;

use crate::state::AppState;

pub mod directory;
pub mod dto;
pub mod handlers;
pub mod model;
mod repo;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
