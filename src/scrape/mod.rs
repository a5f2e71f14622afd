pub mod candidate;
pub mod extract;
pub mod pipeline;

// Re-export common types
pub use candidate::{CandidateIdentity, SourceKind};
pub use extract::IdentityExtractor;
pub use pipeline::Scraper;
