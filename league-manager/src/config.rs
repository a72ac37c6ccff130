//! Typed configuration loaded from environment variables: a plain struct
//! with a `Default` impl and per-field override points, populated by
//! `main` before anything in the library is constructed (spec §6 —
//! config file loading stays out of scope; there is no format beyond
//! flat env vars).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub auth_enabled: bool,
    pub min_players: usize,
    pub min_referees: usize,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
    pub clock_skew_seconds: u64,
    pub referee_cooldown_seconds: u64,
    pub auth_failure_suspend_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "league-manager.sqlite3".to_string(),
            auth_enabled: true,
            min_players: 2,
            min_referees: 1,
            retry_max: 3,
            retry_backoff_ms: 200,
            clock_skew_seconds: 120,
            referee_cooldown_seconds: 30,
            auth_failure_suspend_threshold: 5,
        }
    }
}

impl Config {
    /// Loads overrides from the process environment, falling back to
    /// [`Default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("LEAGUE_HOST", defaults.host),
            port: env_parsed_or("LEAGUE_PORT", defaults.port),
            database_path: env_or("LEAGUE_DATABASE_PATH", defaults.database_path),
            auth_enabled: env_parsed_or("LEAGUE_AUTH_ENABLED", defaults.auth_enabled),
            min_players: env_parsed_or("LEAGUE_MIN_PLAYERS", defaults.min_players),
            min_referees: env_parsed_or("LEAGUE_MIN_REFEREES", defaults.min_referees),
            retry_max: env_parsed_or("LEAGUE_RETRY_MAX", defaults.retry_max),
            retry_backoff_ms: env_parsed_or("LEAGUE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            clock_skew_seconds: env_parsed_or("LEAGUE_CLOCK_SKEW_SECONDS", defaults.clock_skew_seconds),
            referee_cooldown_seconds: env_parsed_or(
                "LEAGUE_REFEREE_COOLDOWN_SECONDS",
                defaults.referee_cooldown_seconds,
            ),
            auth_failure_suspend_threshold: env_parsed_or(
                "LEAGUE_AUTH_FAILURE_SUSPEND_THRESHOLD",
                defaults.auth_failure_suspend_threshold,
            ),
        }
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }

    pub fn referee_cooldown(&self) -> Duration {
        Duration::from_secs(self.referee_cooldown_seconds)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
