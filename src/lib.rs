pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod routing;
pub mod state;

pub use app::app;
pub use state::AppState;

#[cfg(test)]
pub mod testing;
