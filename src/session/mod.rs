pub mod orchestrator;
pub mod runner;
pub mod sampler;
pub mod state;

// Re-export common types
pub use orchestrator::{Orchestrator, RunOutcome, SessionOutcome};
pub use runner::{execute_session_task, SessionJob};
pub use sampler::Sampler;
pub use state::{SessionState, SessionStats};
