// =============================================================================
// Config & Secret Loader — layered configuration resolution
// =============================================================================
//
// Precedence, high to low: runtime overrides, environment, persisted
// `scheduler_settings` row for the source, compiled defaults. Every field
// carries a `#[serde(default = "...")]` so older persisted rows never fail
// to deserialize when new fields are added.
//
// `validate()` fails fast with `ErrorKind::Config` — CONFIG errors are never
// retried (§7): the scheduler refuses to start a job whose config doesn't
// validate.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::errors::ClassifiedError;

fn default_frequency_hours() -> f64 {
    4.0
}

fn default_true() -> bool {
    true
}

fn default_proxy_rotation_strategy() -> ProxyRotationStrategy {
    ProxyRotationStrategy::HealthBased
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout_seconds() -> u64 {
    300
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_db_dsn() -> String {
    "sqlite://harvester.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_decay_rate_weekly() -> f64 {
    0.05
}

fn default_inactive_days_threshold() -> i64 {
    7
}

fn default_expiration_days_threshold() -> i64 {
    30
}

/// Proxy selection strategy (§4.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyRotationStrategy {
    HealthBased,
    RoundRobin,
    Random,
}

impl ProxyRotationStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "health_based" => Some(Self::HealthBased),
            "round_robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

/// One configured proxy entry parsed from `proxy_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySpec {
    pub server: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Fully-resolved configuration for the whole process (global options) plus
/// one set of per-source overrides. Read-only after resolution — updates
/// produce a new snapshot that is atomically swapped in (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    #[serde(default = "default_frequency_hours")]
    pub frequency_hours: f64,

    #[serde(default)]
    pub proxy_list: Vec<ProxySpec>,

    #[serde(default = "default_proxy_rotation_strategy")]
    pub proxy_rotation_strategy: ProxyRotationStrategy,

    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    #[serde(default = "default_circuit_breaker_timeout_seconds")]
    pub circuit_breaker_timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub require_proxies: bool,

    #[serde(default = "default_db_dsn")]
    pub db_dsn: String,

    #[serde(default = "default_true")]
    pub json_logging: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_decay_rate_weekly")]
    pub decay_rate_weekly: f64,

    #[serde(default = "default_inactive_days_threshold")]
    pub inactive_days_threshold: i64,

    #[serde(default = "default_expiration_days_threshold")]
    pub expiration_days_threshold: i64,

    #[serde(default = "default_true")]
    pub archive_enabled: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            frequency_hours: default_frequency_hours(),
            proxy_list: Vec::new(),
            proxy_rotation_strategy: default_proxy_rotation_strategy(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_seconds: default_circuit_breaker_timeout_seconds(),
            headless: true,
            locale: default_locale(),
            timezone: default_timezone(),
            user_agent: default_user_agent(),
            require_proxies: false,
            db_dsn: default_db_dsn(),
            json_logging: true,
            log_level: default_log_level(),
            decay_rate_weekly: default_decay_rate_weekly(),
            inactive_days_threshold: default_inactive_days_threshold(),
            expiration_days_threshold: default_expiration_days_threshold(),
            archive_enabled: true,
        }
    }
}

impl ResolvedConfig {
    /// Resolve a config snapshot: start from compiled defaults, layer env
    /// vars on top, then apply `overrides` last. The remaining layer in
    /// §4.1's precedence — a platform's persisted `scheduler_settings.
    /// frequency_hours` — isn't folded in here, since it's per-platform and
    /// this snapshot is process-wide; the scheduler layers it in per run via
    /// `with_frequency_hours` instead (see `Scheduler::reconcile_tick`).
    pub fn resolve(overrides: Option<ResolvedConfig>) -> Result<Self, ClassifiedError> {
        let mut cfg = ResolvedConfig::default();
        cfg.apply_env();
        if let Some(o) = overrides {
            cfg.merge_runtime_override(o);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse `proxy_list` into [`ProxySpec`]s from a comma-separated string
    /// of `[user:pass@]host:port` entries.
    pub fn parse_proxy_list(raw: &str) -> Result<Vec<ProxySpec>, ClassifiedError> {
        let mut out = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (creds, server) = match entry.split_once('@') {
                Some((creds, server)) => (Some(creds), server),
                None => (None, entry),
            };

            if server.is_empty() {
                return Err(ClassifiedError::config_invalid(format!(
                    "malformed proxy entry: '{entry}'"
                )));
            }

            let (username, password) = match creds {
                Some(c) => match c.split_once(':') {
                    Some((u, p)) if !u.is_empty() && !p.is_empty() => {
                        (Some(u.to_string()), Some(p.to_string()))
                    }
                    _ => {
                        return Err(ClassifiedError::config_invalid(format!(
                            "malformed proxy credentials in '{entry}'"
                        )))
                    }
                },
                None => (None, None),
            };

            out.push(ProxySpec {
                server: server.to_string(),
                username,
                password,
            });
        }
        Ok(out)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("FREQUENCY_HOURS") {
            if let Ok(v) = v.parse() {
                self.frequency_hours = v;
            }
        }
        if let Ok(v) = std::env::var("PROXY_LIST") {
            if let Ok(parsed) = Self::parse_proxy_list(&v) {
                self.proxy_list = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROXY_ROTATION_STRATEGY") {
            if let Some(s) = ProxyRotationStrategy::parse(&v) {
                self.proxy_rotation_strategy = s;
            }
        }
        if let Ok(v) = std::env::var("REQUIRE_PROXIES") {
            self.require_proxies = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("DB_DSN") {
            self.db_dsn = v;
        }
        if let Ok(v) = std::env::var("JSON_LOGGING") {
            self.json_logging = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("HEADLESS") {
            self.headless = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("LOCALE") {
            self.locale = v;
        }
        if let Ok(v) = std::env::var("TIMEZONE") {
            self.timezone = v;
        }
    }

    fn merge_runtime_override(&mut self, o: ResolvedConfig) {
        *self = o;
    }

    /// Apply a persisted `scheduler_settings` row's `frequency_hours` and
    /// keep everything else. Used by the scheduler when it reloads per-source
    /// rows on its reconciliation tick (§4.11).
    pub fn with_frequency_hours(mut self, hours: f64) -> Self {
        self.frequency_hours = hours.clamp(0.5, 24.0);
        self
    }

    /// Validate the resolved snapshot, failing with `CONFIG/invalid` per
    /// §4.1. `require_proxies` with an empty pool fails with
    /// `CONFIG/missing`, matching spec.md's explicit startup-failure rule.
    pub fn validate(&self) -> Result<(), ClassifiedError> {
        if !(0.5..=24.0).contains(&self.frequency_hours) {
            return Err(ClassifiedError::config_invalid(format!(
                "frequency_hours {} outside [0.5, 24]",
                self.frequency_hours
            )));
        }

        for p in &self.proxy_list {
            if p.server.trim().is_empty() {
                return Err(ClassifiedError::config_invalid("empty proxy server url"));
            }
            let has_user = p.username.as_ref().is_some_and(|u| !u.is_empty());
            let has_pass = p.password.as_ref().is_some_and(|p| !p.is_empty());
            if has_user != has_pass {
                return Err(ClassifiedError::config_invalid(
                    "proxy credentials must supply both username and password",
                ));
            }
        }

        if self.require_proxies && self.proxy_list.is_empty() {
            return Err(ClassifiedError::config_missing(
                "require_proxies is set but no proxies are configured",
            ));
        }

        if self.db_dsn.trim().is_empty() {
            return Err(ClassifiedError::config_invalid("db_dsn must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ResolvedConfig::default().validate().is_ok());
    }

    #[test]
    fn frequency_hours_out_of_range_is_invalid() {
        let mut cfg = ResolvedConfig::default();
        cfg.frequency_hours = 0.1;
        assert!(cfg.validate().is_err());
        cfg.frequency_hours = 25.0;
        assert!(cfg.validate().is_err());
        cfg.frequency_hours = 2.5;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn require_proxies_without_proxies_fails_config_missing() {
        let mut cfg = ResolvedConfig::default();
        cfg.require_proxies = true;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Config);
        assert_eq!(err.subcode, "missing");
    }

    #[test]
    fn parse_proxy_list_handles_credentials() {
        let specs = ResolvedConfig::parse_proxy_list("1.2.3.4:8080,user:pass@5.6.7.8:9090").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].server, "1.2.3.4:8080");
        assert!(specs[0].username.is_none());
        assert_eq!(specs[1].server, "5.6.7.8:9090");
        assert_eq!(specs[1].username.as_deref(), Some("user"));
        assert_eq!(specs[1].password.as_deref(), Some("pass"));
    }

    #[test]
    fn parse_proxy_list_rejects_malformed_credentials() {
        assert!(ResolvedConfig::parse_proxy_list("user@host:1").is_err());
    }

    #[test]
    fn with_frequency_hours_clamps() {
        let cfg = ResolvedConfig::default().with_frequency_hours(100.0);
        assert_eq!(cfg.frequency_hours, 24.0);
        let cfg = ResolvedConfig::default().with_frequency_hours(0.01);
        assert_eq!(cfg.frequency_hours, 0.5);
    }
}
