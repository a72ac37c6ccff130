//! Typed configuration loaded from environment variables, same shape as
//! `league-manager`'s `Config`: a plain struct with a `Default` impl,
//! overridden field-by-field from env vars by `main` before any library
//! code runs.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub agent_id: String,
    pub endpoint: String,
    pub manager_endpoint: String,
    pub auth_enabled: bool,
    pub move_timeout_seconds: u64,
    pub match_timeout_seconds: u64,
    pub invite_timeout_seconds: u64,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
    pub clock_skew_seconds: u64,
    pub checkpoint_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            agent_id: "referee-1".to_string(),
            endpoint: "http://127.0.0.1:8081".to_string(),
            manager_endpoint: "http://127.0.0.1:8080".to_string(),
            auth_enabled: true,
            move_timeout_seconds: 5,
            match_timeout_seconds: 300,
            invite_timeout_seconds: 10,
            retry_max: 3,
            retry_backoff_ms: 200,
            clock_skew_seconds: 120,
            checkpoint_path: "league-referee.checkpoint.json".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("REFEREE_HOST", defaults.host),
            port: env_parsed_or("REFEREE_PORT", defaults.port),
            agent_id: env_or("REFEREE_AGENT_ID", defaults.agent_id),
            endpoint: env_or("REFEREE_ENDPOINT", defaults.endpoint),
            manager_endpoint: env_or("LEAGUE_MANAGER_ENDPOINT", defaults.manager_endpoint),
            auth_enabled: env_parsed_or("LEAGUE_AUTH_ENABLED", defaults.auth_enabled),
            move_timeout_seconds: env_parsed_or("LEAGUE_MOVE_TIMEOUT_SECONDS", defaults.move_timeout_seconds),
            match_timeout_seconds: env_parsed_or("LEAGUE_MATCH_TIMEOUT_SECONDS", defaults.match_timeout_seconds),
            invite_timeout_seconds: env_parsed_or("LEAGUE_INVITE_TIMEOUT_SECONDS", defaults.invite_timeout_seconds),
            retry_max: env_parsed_or("LEAGUE_RETRY_MAX", defaults.retry_max),
            retry_backoff_ms: env_parsed_or("LEAGUE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            clock_skew_seconds: env_parsed_or("LEAGUE_CLOCK_SKEW_SECONDS", defaults.clock_skew_seconds),
            checkpoint_path: env_or("REFEREE_CHECKPOINT_PATH", defaults.checkpoint_path),
        }
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(self.move_timeout_seconds)
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_seconds)
    }

    pub fn invite_timeout(&self) -> Duration {
        Duration::from_secs(self.invite_timeout_seconds)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
