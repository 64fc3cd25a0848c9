pub mod ai;
pub mod app;
pub mod classify;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod keywords;
pub mod models;
pub mod stats;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
