pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod operation_tracker;
pub mod run_context;
pub mod scheduler;
pub mod services;
pub mod spotify;
pub mod stages;
pub mod storage;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigManager};
pub use database::Database;
pub use errors::{PipelineError, PipelineResult};
pub use operation_tracker::RunLeaseTracker;
pub use run_context::{RunContext, Trigger};
pub use services::{AlertService, WorkflowRunner};
