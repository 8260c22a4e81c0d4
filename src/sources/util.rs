// =============================================================================
// Shared adapter helpers — engagement-string parsing, selector fallback chain
// =============================================================================
//
// Free functions on a shared utility module (§9 "multiple inheritance/adapter
// mixins" design note): every per-platform adapter calls into these instead
// of re-implementing suffix parsing or fallback-selector looping.
// =============================================================================

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;

/// Parse an engagement count string with a K/M/B suffix, e.g. `"5.2K"` ->
/// `5200`, `"1.2M"` -> `1200000`, `"3.4B"` -> `3_400_000_000`. Plain numeric
/// strings (optionally with thousands separators) parse directly. Returns
/// `None` for anything unparseable — callers fall back to zero with a
/// warning per §4.6 rule 4, they never raise on this.
pub fn parse_engagement_count(raw: &str) -> Option<u64> {
    let s = raw.trim().replace(',', "");
    if s.is_empty() {
        return None;
    }

    let (digits, multiplier) = match s.chars().last()? {
        'k' | 'K' => (&s[..s.len() - 1], 1_000.0),
        'm' | 'M' => (&s[..s.len() - 1], 1_000_000.0),
        'b' | 'B' => (&s[..s.len() - 1], 1_000_000_000.0),
        _ => (s.as_str(), 1.0),
    };

    let value: f64 = digits.trim().parse().ok()?;
    Some((value * multiplier).round() as u64)
}

/// Try each selector in `selectors` in order against the current page,
/// returning the text of the first non-empty match. Returns
/// `SCRAPE/element_not_found` only after every fallback has been tried, per
/// §4.6 rule 3.
pub async fn query_with_fallback(
    handle: &dyn BrowserHandle,
    field_name: &str,
    selectors: &[&str],
) -> Result<String, ClassifiedError> {
    for selector in selectors {
        if let Ok(matches) = handle.query_all(selector).await {
            if let Some(first) = matches.into_iter().find(|m| !m.text.trim().is_empty()) {
                return Ok(first.text);
            }
        }
    }
    Err(ClassifiedError::scrape_element_not_found(format!(
        "no selector matched for field '{field_name}' after {} fallbacks",
        selectors.len()
    )))
}

/// Same as `query_with_fallback` but never raises — missing optional fields
/// default to an empty string with a `warn!`, per §4.6 rule 4.
pub async fn query_optional(handle: &dyn BrowserHandle, field_name: &str, selectors: &[&str]) -> String {
    match query_with_fallback(handle, field_name, selectors).await {
        Ok(text) => text,
        Err(_) => {
            tracing::warn!(field = field_name, "optional field missing, defaulting to empty");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_k_suffix() {
        assert_eq!(parse_engagement_count("5.2K"), Some(5200));
    }

    #[test]
    fn parses_m_suffix() {
        assert_eq!(parse_engagement_count("1.2M"), Some(1_200_000));
    }

    #[test]
    fn parses_b_suffix() {
        assert_eq!(parse_engagement_count("3.4B"), Some(3_400_000_000));
    }

    #[test]
    fn parses_plain_number_with_separators() {
        assert_eq!(parse_engagement_count("1,234"), Some(1234));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(parse_engagement_count(""), None);
        assert_eq!(parse_engagement_count("n/a"), None);
    }
}
