// =============================================================================
// Shared types used across the trend harvester
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported social platforms. This is the closed set named in spec.md §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    TikTok,
    Instagram,
    LinkedIn,
    Facebook,
    YouTube,
    X,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::TikTok,
        Platform::Instagram,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::YouTube,
        Platform::X,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::YouTube => "youtube",
            Platform::X => "x",
        }
    }

    pub fn parse(s: &str) -> Option<Platform> {
        match s.to_lowercase().as_str() {
            "tiktok" => Some(Platform::TikTok),
            "instagram" => Some(Platform::Instagram),
            "linkedin" => Some(Platform::LinkedIn),
            "facebook" => Some(Platform::Facebook),
            "youtube" => Some(Platform::YouTube),
            "x" | "twitter" => Some(Platform::X),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a [`crate::etl::raw::TrendRecord`]'s owning trend. Transitions
/// are monotonic: active -> declining -> archived, never backward (P10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Active,
    Declining,
    Archived,
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendStatus::Active => write!(f, "active"),
            TrendStatus::Declining => write!(f, "declining"),
            TrendStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Status of one scheduler-triggered run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithWarnings,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithWarnings => write!(f, "completed_with_warnings"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        for p in Platform::ALL {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn platform_parse_accepts_twitter_alias() {
        assert_eq!(Platform::parse("twitter"), Some(Platform::X));
    }
}
