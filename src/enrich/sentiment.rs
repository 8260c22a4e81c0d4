// =============================================================================
// Sentiment — lexicon polarity scoring with a two-detector compound (§4.7)
// =============================================================================
//
// Pure, deterministic, no network/model dependency — appropriate for a batch
// harvester with no ML runtime in its ambient stack (SPEC_FULL §2 C7). Two
// independent lexicon passes (a general-purpose word list and a social-media
// slang/emoji-aware word list) stand in for the original system's "if two
// detectors are available" design; their compound average drives the label,
// and both are retained in the per-sample breakdown.
// =============================================================================

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

const POSITIVE_WORDS: &[&str] = &[
    "love", "great", "amazing", "awesome", "good", "happy", "best", "beautiful", "fire", "win",
    "wow", "incredible", "perfect", "excited", "fantastic",
];
const NEGATIVE_WORDS: &[&str] = &[
    "hate", "bad", "terrible", "worst", "awful", "sad", "angry", "fail", "broken", "disgusting",
    "cringe", "boring", "disappointed", "scam", "ugly",
];

const POSITIVE_SLANG: &[&str] = &[
    "slay", "fire", "goated", "bussin", "lit", "💯", "🔥", "❤️", "😍", "lol", "iconic",
];
const NEGATIVE_SLANG: &[&str] = &["mid", "cap", "flop", "sus", "😢", "💀", "cringe", "trash"];

/// The classified sentiment label (§3 `TrendVersion.sentiment_label`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Positive if polarity > 0.1, negative if < -0.1, else neutral (§4.7).
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > 0.1 {
            SentimentLabel::Positive
        } else if polarity < -0.1 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        };
        write!(f, "{s}")
    }
}

/// One detector's raw polarity over one caption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub detector: &'static str,
    pub polarity: f64,
}

/// Result of scoring one caption: compound polarity + per-detector
/// breakdown (§4.7 "also store per-detector breakdown").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub polarity: f64,
    pub label: SentimentLabel,
    pub breakdown: Vec<SentimentSignal>,
}

fn lexicon_polarity(text: &str, positive: &[&str], negative: &[&str]) -> f64 {
    let lower = text.to_lowercase();
    let mut hits = 0i32;
    let mut total = 0i32;
    for word in positive {
        let count = lower.matches(word).count() as i32;
        hits += count;
        total += count;
    }
    for word in negative {
        let count = lower.matches(word).count() as i32;
        hits -= count;
        total += count;
    }
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64).clamp(-1.0, 1.0)
    }
}

/// Score one caption with both lexicon detectors and compound-average them
/// (§4.7: "if two detectors are available, their compound average drives
/// the label").
pub fn score_sentiment(caption: &str) -> SentimentScore {
    let general = lexicon_polarity(caption, POSITIVE_WORDS, NEGATIVE_WORDS);
    let slang = lexicon_polarity(caption, POSITIVE_SLANG, NEGATIVE_SLANG);
    let polarity = ((general + slang) / 2.0).clamp(-1.0, 1.0);

    SentimentScore {
        polarity,
        label: SentimentLabel::from_polarity(polarity),
        breakdown: vec![
            SentimentSignal {
                detector: "lexicon_general",
                polarity: general,
            },
            SentimentSignal {
                detector: "lexicon_slang",
                polarity: slang,
            },
        ],
    }
}

/// Aggregated sentiment across all samples of a trend (§4.7 "Aggregation
/// across samples"): polarity is the arithmetic mean, label is the most
/// common label among samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub polarity: f64,
    pub label: SentimentLabel,
    pub sample_count: usize,
}

impl SentimentAggregate {
    pub fn from_scores(scores: &[SentimentScore]) -> Self {
        if scores.is_empty() {
            return Self {
                polarity: 0.0,
                label: SentimentLabel::Neutral,
                sample_count: 0,
            };
        }

        let polarity = scores.iter().map(|s| s.polarity).sum::<f64>() / scores.len() as f64;

        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for s in scores {
            *counts.entry(label_key(s.label)).or_insert(0) += 1;
        }
        let most_common = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(k, _)| k)
            .unwrap_or("neutral");

        Self {
            polarity,
            label: match most_common {
                "positive" => SentimentLabel::Positive,
                "negative" => SentimentLabel::Negative,
                _ => SentimentLabel::Neutral,
            },
            sample_count: scores.len(),
        }
    }
}

fn label_key(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "positive",
        SentimentLabel::Neutral => "neutral",
        SentimentLabel::Negative => "negative",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_caption_scores_above_threshold() {
        let score = score_sentiment("this is amazing and I love it, so fire!");
        assert_eq!(score.label, SentimentLabel::Positive);
        assert!(score.polarity > 0.1);
    }

    #[test]
    fn negative_caption_scores_below_threshold() {
        let score = score_sentiment("worst, terrible, hate this trash");
        assert_eq!(score.label, SentimentLabel::Negative);
    }

    #[test]
    fn neutral_caption_with_no_lexicon_hits() {
        let score = score_sentiment("the quarterly report is attached");
        assert_eq!(score.label, SentimentLabel::Neutral);
        assert_eq!(score.polarity, 0.0);
    }

    #[test]
    fn aggregate_uses_mean_polarity_and_mode_label() {
        let scores = vec![
            score_sentiment("amazing love it"),
            score_sentiment("amazing love it"),
            score_sentiment("worst hate this"),
        ];
        let agg = SentimentAggregate::from_scores(&scores);
        assert_eq!(agg.label, SentimentLabel::Positive);
        assert_eq!(agg.sample_count, 3);
    }

    #[test]
    fn empty_scores_default_to_neutral() {
        let agg = SentimentAggregate::from_scores(&[]);
        assert_eq!(agg.label, SentimentLabel::Neutral);
        assert_eq!(agg.sample_count, 0);
    }
}
