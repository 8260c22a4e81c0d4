// =============================================================================
// Sentiment & Language (C7) — §4.7
// =============================================================================

pub mod language;
pub mod sentiment;

pub use language::{detect_language, LanguageAggregate, LanguageSignal};
pub use sentiment::{score_sentiment, SentimentAggregate, SentimentLabel, SentimentSignal};
