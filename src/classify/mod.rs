pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod verdict;

// Re-export common types
pub use pipeline::AudienceClassifier;
pub use verdict::{AudienceLabel, AudienceVerdict};
