pub mod routes;

// Re-export common types
pub use routes::{serve, AppState};
