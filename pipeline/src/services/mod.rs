pub mod alert_service;
pub mod workflow_runner;

pub use alert_service::AlertService;
pub use workflow_runner::{RetryPolicy, WorkflowRunner};
