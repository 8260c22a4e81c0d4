// =============================================================================
// Error Taxonomy — classified error kinds with severity
// =============================================================================
//
// A closed set of error kinds (§4.3). Every error raised anywhere in the
// pipeline is wrapped in a `ClassifiedError` before it crosses a stage
// boundary, so logs/metrics can always report `kind` and `severity` without
// string-matching on error messages.
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error kinds recognized by the harvester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing/invalid credentials, challenge required.
    Auth,
    /// DNS, refused, reset.
    Network,
    /// Any deadline exceeded.
    Timeout,
    /// Proxy-specific connect/auth/timeout.
    Proxy,
    /// Source pushes back (429 or equivalent).
    RateLimit,
    /// Navigation, element-not-found, parse failure.
    Scrape,
    /// Validation, transformation failure.
    Data,
    /// Connect, query, upsert failure.
    Database,
    /// Missing/invalid configuration.
    Config,
    /// Anything that doesn't classify cleanly.
    Unknown,
}

impl ErrorKind {
    /// Severity associated with this kind, per §4.3.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::Auth => Severity::High,
            ErrorKind::Network => Severity::Medium,
            ErrorKind::Timeout => Severity::Medium,
            ErrorKind::Proxy => Severity::Medium,
            ErrorKind::RateLimit => Severity::Medium,
            ErrorKind::Scrape => Severity::Medium,
            ErrorKind::Data => Severity::Low,
            ErrorKind::Database => Severity::High,
            ErrorKind::Config => Severity::High,
            ErrorKind::Unknown => Severity::Medium,
        }
    }

    /// Machine-readable tag used for `KIND/subcode` style error codes
    /// (e.g. `CONFIG/missing`, `DATA/validation`).
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::Auth => "AUTH",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Proxy => "PROXY",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Scrape => "SCRAPE",
            ErrorKind::Data => "DATA",
            ErrorKind::Database => "DATABASE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Severity associated with an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// An error wrapped with its classified kind. Preserves the originating
/// message/chain via `#[source]` so `{:#}` formatting still shows the root
/// cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}/{subcode}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Short machine-readable subcode, e.g. "missing", "invalid", "duplicate".
    pub subcode: &'static str,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, subcode: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            subcode,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        subcode: &'static str,
        message: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind,
            subcode,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, "missing", message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, "invalid", message)
    }

    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, "validation", message)
    }

    pub fn data_duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, "duplicate", message)
    }

    pub fn scrape_element_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scrape, "element_not_found", message)
    }

    pub fn proxy_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Proxy, "unavailable", message)
    }
}

/// Classify a raw `anyhow::Error` into a best-guess `ErrorKind` based on
/// coarse heuristics over the error's display text. Used at adapter/network
/// boundaries where the underlying error is a third-party type (reqwest,
/// sqlx, …) that doesn't already carry a `ClassifiedError`.
pub fn classify(err: anyhow::Error) -> ClassifiedError {
    if let Some(c) = err.downcast_ref::<ClassifiedError>() {
        // Re-wrap cheaply: clone kind/subcode, keep message, attach original.
        return ClassifiedError::with_source(c.kind, c.subcode, c.message.clone(), err);
    }

    let text = err.to_string().to_lowercase();
    let kind = if text.contains("timed out") || text.contains("timeout") {
        ErrorKind::Timeout
    } else if text.contains("dns") || text.contains("connection refused") || text.contains("reset")
    {
        ErrorKind::Network
    } else if text.contains("429") || text.contains("rate limit") {
        ErrorKind::RateLimit
    } else if text.contains("proxy") {
        ErrorKind::Proxy
    } else if text.contains("unauthorized") || text.contains("forbidden") || text.contains("auth")
    {
        ErrorKind::Auth
    } else if text.contains("selector") || text.contains("element") || text.contains("navigat") {
        ErrorKind::Scrape
    } else if text.contains("sqlx") || text.contains("database") || text.contains("upsert") {
        ErrorKind::Database
    } else {
        ErrorKind::Unknown
    };

    let subcode: &'static str = "classified";
    ClassifiedError::with_source(kind, subcode, "classified error", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_mapping_matches_spec() {
        assert_eq!(ErrorKind::Auth.severity(), Severity::High);
        assert_eq!(ErrorKind::Network.severity(), Severity::Medium);
        assert_eq!(ErrorKind::Data.severity(), Severity::Low);
        assert_eq!(ErrorKind::Database.severity(), Severity::High);
        assert_eq!(ErrorKind::Config.severity(), Severity::High);
    }

    #[test]
    fn classify_detects_timeout() {
        let err = anyhow::anyhow!("request timed out after 10s");
        let classified = classify(err);
        assert_eq!(classified.kind, ErrorKind::Timeout);
    }

    #[test]
    fn classify_detects_rate_limit() {
        let err = anyhow::anyhow!("server responded 429 Too Many Requests");
        assert_eq!(classify(err).kind, ErrorKind::RateLimit);
    }

    #[test]
    fn classify_passes_through_classified_error() {
        let inner = ClassifiedError::data_duplicate("dup url");
        let wrapped = anyhow::Error::new(inner);
        let classified = classify(wrapped);
        assert_eq!(classified.kind, ErrorKind::Data);
        assert_eq!(classified.subcode, "duplicate");
    }
}
