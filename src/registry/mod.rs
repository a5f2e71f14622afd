pub mod store;
pub mod task;

// Re-export common types
pub use store::{StopFlag, TaskLog, TaskRegistry};
pub use task::{TaskRecord, TaskStatus};
