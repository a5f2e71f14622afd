pub mod credentials;
pub mod dataset;

// Re-export common types
pub use credentials::{CredentialStore, PgCredentialStore, StoredCookie};
pub use dataset::{export_results, load_targets, TargetKind, TargetList};
