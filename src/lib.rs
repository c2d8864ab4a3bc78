pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::{RunOptions, SyncPipeline};
pub use domain::entities::RunSummary;
pub use shared::{AppConfig, AppError, Result};
