//! Feedback analysis: classification of free-text customer feedback via an
//! external chat-completion collaborator, with a deterministic keyword
//! fallback and best-effort persistence to the feedback-history table.

pub mod analyzer;
pub mod classifier;
pub mod credentials;
pub mod errors;
pub mod store;

pub use analyzer::{FeedbackAnalysis, FeedbackAnalyzer, Sentiment};
pub use classifier::{ChatCompletionClient, Classifier, ClassifierConfig};
pub use credentials::ApiKeySource;
pub use errors::{AnalysisError, Result};
pub use store::{FeedbackStore, HistorySnapshot};
