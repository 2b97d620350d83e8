use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HushError;

/// Default admission delay when nothing is configured (one minute).
pub const DEFAULT_DELAY_MS: u64 = 60_000;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled key: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_opt<F>(lookup: &F, profile: &str, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup(&prefixed) {
            return Some(v);
        }
    }
    lookup(key)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub queue: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HUSH_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, HushError> {
        let profile = env_or("HUSH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, HushError> {
        Self::from_source(profile, env_opt)
    }

    /// Build config from an arbitrary key lookup instead of the process env.
    pub fn from_source<F>(profile: &str, lookup: F) -> Result<Self, HushError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let p = profile.to_uppercase();
        Ok(Self {
            queue: QueueConfig::from_source(&p, &lookup)?,
            profile: p,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  queue:       default_delay_ms={}, duplicate_policy={}, shutdown_hook={}",
            self.queue.default_delay_ms,
            self.queue.duplicate_policy,
            self.queue.shutdown_hook
        );
    }
}

// ── Queue ─────────────────────────────────────────────────────

/// What to do when an entry is about to be admitted while an entry with the
/// same key already sits in the admitted sequence.
///
/// Applied identically at every admission site: timer expiry, zero-delay
/// submission and forced flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Always admit, even if an equal entry is already admitted.
    Allow,
    /// Drop the admission when an equal entry is already admitted.
    #[default]
    SkipAdmitted,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::SkipAdmitted => f.write_str("skip_admitted"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = HushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "skip_admitted" | "skip" => Ok(Self::SkipAdmitted),
            other => Err(HushError::InvalidConfiguration(format!(
                "unknown duplicate policy '{other}' (expected 'allow' or 'skip_admitted')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delay applied to submissions that carry no override, in milliseconds.
    pub default_delay_ms: u64,
    pub duplicate_policy: DuplicatePolicy,
    /// Register each queue with the process-wide shutdown registry.
    pub shutdown_hook: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: DEFAULT_DELAY_MS,
            duplicate_policy: DuplicatePolicy::default(),
            shutdown_hook: true,
        }
    }
}

impl QueueConfig {
    fn from_source<F>(p: &str, lookup: &F) -> Result<Self, HushError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_delay_ms = match profiled_opt(lookup, p, "HUSH_DEFAULT_DELAY_MS") {
            Some(raw) => parse_delay_ms(&raw)?,
            None => DEFAULT_DELAY_MS,
        };
        let duplicate_policy = match profiled_opt(lookup, p, "HUSH_DUPLICATE_POLICY") {
            Some(raw) => raw.parse()?,
            None => DuplicatePolicy::default(),
        };
        let shutdown_hook = profiled_opt(lookup, p, "HUSH_SHUTDOWN_HOOK")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            default_delay_ms,
            duplicate_policy,
            shutdown_hook,
        })
    }
}

/// Parse a signed millisecond count, rejecting negatives instead of clamping.
pub fn parse_delay_ms(raw: &str) -> Result<u64, HushError> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        HushError::InvalidConfiguration(format!("delay '{raw}' is not an integer"))
    })?;
    validate_delay_ms(value)
}

/// Reject negative delays.
pub fn validate_delay_ms(value: i64) -> Result<u64, HushError> {
    u64::try_from(value).map_err(|_| {
        HushError::InvalidConfiguration(format!("delay must be non-negative, got {value}ms"))
    })
}
