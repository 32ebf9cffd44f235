//! HTTP API for submitting questions and following their progress.

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
