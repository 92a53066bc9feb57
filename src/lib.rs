pub mod access;
pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod detection;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod services;
pub mod storage;

pub use app::{router, AppState, Components};
pub use config::AppConfig;
