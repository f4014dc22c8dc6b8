//! Athenaeum Library Management System
//!
//! A REST JSON API for managing a library catalog, physical copies,
//! borrow requests and fines. The borrow lifecycle engine keeps the
//! inventory counters, the copy pool and the borrow records consistent
//! under concurrent requests.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
