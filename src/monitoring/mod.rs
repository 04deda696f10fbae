pub mod probe;
pub mod scheduler;
pub mod service;

pub use scheduler::Scheduler;
pub use service::{MonitorError, MonitorService, MONITOR_JOB_ID};
