// =============================================================================
// Language detection — heuristic script/stopword detector (§4.7)
// =============================================================================
//
// A deterministic, stopword-frequency heuristic over a small closed set of
// ISO-639-1 languages. Not a statistical model — matching this spec's
// ambient stack, which carries no ML runtime — but sufficient to produce a
// confidence-scored guess the way §4.7 requires ("detect ISO-639-1 +
// confidence; if confidence < min_confidence, language is unknown").
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "is", "this", "that", "with", "for", "you", "are"]),
    ("es", &["el", "la", "de", "que", "y", "en", "los", "para", "con"]),
    ("fr", &["le", "la", "de", "et", "les", "des", "pour", "avec", "une"]),
    ("pt", &["o", "a", "de", "que", "para", "com", "uma", "os", "nao"]),
    ("de", &["der", "die", "das", "und", "ist", "mit", "fur", "nicht"]),
];

/// Default confidence floor below which a detection collapses to "unknown"
/// (§4.7).
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// One candidate language's score for a given text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSignal {
    pub language: String,
    pub confidence: f64,
}

/// Detect ISO-639-1 + confidence for one caption. Returns `"unknown"` with
/// confidence 0.0 both when the text is too short to judge and when the best
/// candidate's confidence falls below `min_confidence`.
pub fn detect_language(text: &str, min_confidence: f64) -> LanguageSignal {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return LanguageSignal {
            language: "unknown".to_string(),
            confidence: 0.0,
        };
    }

    let mut best: Option<(&str, f64)> = None;
    for (lang, stopwords) in STOPWORDS {
        let hits = words.iter().filter(|w| stopwords.contains(w)).count();
        let confidence = hits as f64 / words.len() as f64;
        if best.map(|(_, c)| confidence > c).unwrap_or(true) {
            best = Some((lang, confidence));
        }
    }

    match best {
        Some((lang, confidence)) if confidence >= min_confidence => LanguageSignal {
            language: lang.to_string(),
            confidence,
        },
        Some((_, confidence)) => LanguageSignal {
            language: "unknown".to_string(),
            confidence,
        },
        None => LanguageSignal {
            language: "unknown".to_string(),
            confidence: 0.0,
        },
    }
}

/// Aggregated language signal across all samples of a trend (§4.7
/// "language distribution = count map; primary language = argmax count with
/// its percent; mean confidence over primary-language samples").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageAggregate {
    pub primary_language: String,
    pub primary_percent: f64,
    pub mean_confidence: f64,
    pub distribution: HashMap<String, u32>,
}

impl LanguageAggregate {
    pub fn from_signals(signals: &[LanguageSignal]) -> Self {
        if signals.is_empty() {
            return Self {
                primary_language: "unknown".to_string(),
                primary_percent: 0.0,
                mean_confidence: 0.0,
                distribution: HashMap::new(),
            };
        }

        let mut distribution: HashMap<String, u32> = HashMap::new();
        for s in signals {
            *distribution.entry(s.language.clone()).or_insert(0) += 1;
        }

        let total = signals.len() as f64;
        let (primary_language, primary_count) = distribution
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(lang, count)| (lang.clone(), *count))
            .unwrap_or(("unknown".to_string(), 0));

        let primary_percent = primary_count as f64 / total * 100.0;

        let primary_confidences: Vec<f64> = signals
            .iter()
            .filter(|s| s.language == primary_language)
            .map(|s| s.confidence)
            .collect();
        let mean_confidence = if primary_confidences.is_empty() {
            0.0
        } else {
            primary_confidences.iter().sum::<f64>() / primary_confidences.len() as f64
        };

        Self {
            primary_language,
            primary_percent,
            mean_confidence,
            distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_from_stopwords() {
        let signal = detect_language(
            "this is the best and you are with the community for this",
            DEFAULT_MIN_CONFIDENCE,
        );
        assert_eq!(signal.language, "en");
    }

    #[test]
    fn low_confidence_collapses_to_unknown() {
        let signal = detect_language("xyzzy plugh", DEFAULT_MIN_CONFIDENCE);
        assert_eq!(signal.language, "unknown");
    }

    #[test]
    fn empty_text_is_unknown() {
        let signal = detect_language("", DEFAULT_MIN_CONFIDENCE);
        assert_eq!(signal.language, "unknown");
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn aggregate_picks_argmax_language_with_percent() {
        let signals = vec![
            LanguageSignal {
                language: "en".to_string(),
                confidence: 0.8,
            },
            LanguageSignal {
                language: "en".to_string(),
                confidence: 0.6,
            },
            LanguageSignal {
                language: "es".to_string(),
                confidence: 0.9,
            },
        ];
        let agg = LanguageAggregate::from_signals(&signals);
        assert_eq!(agg.primary_language, "en");
        assert!((agg.primary_percent - 66.666).abs() < 0.01);
        assert!((agg.mean_confidence - 0.7).abs() < 1e-9);
    }
}
