pub mod config;
pub mod error;
pub mod retry;

pub use config::AppConfig;
pub use error::{AppError, Result};
