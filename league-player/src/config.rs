//! Typed configuration loaded from environment variables, same shape as
//! `league-referee`'s `Config`: a plain struct with a `Default` impl,
//! overridden field-by-field from env vars by `main` before any library
//! code runs.

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub agent_id: String,
    pub endpoint: String,
    pub manager_endpoint: String,
    pub auth_enabled: bool,
    pub clock_skew_seconds: u64,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            agent_id: "player-1".to_string(),
            endpoint: "http://127.0.0.1:9001".to_string(),
            manager_endpoint: "http://127.0.0.1:8080".to_string(),
            auth_enabled: true,
            clock_skew_seconds: 120,
            retry_max: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("PLAYER_HOST", defaults.host),
            port: env_parsed_or("PLAYER_PORT", defaults.port),
            agent_id: env_or("PLAYER_AGENT_ID", defaults.agent_id),
            endpoint: env_or("PLAYER_ENDPOINT", defaults.endpoint),
            manager_endpoint: env_or("LEAGUE_MANAGER_ENDPOINT", defaults.manager_endpoint),
            auth_enabled: env_parsed_or("LEAGUE_AUTH_ENABLED", defaults.auth_enabled),
            clock_skew_seconds: env_parsed_or("LEAGUE_CLOCK_SKEW_SECONDS", defaults.clock_skew_seconds),
            retry_max: env_parsed_or("LEAGUE_RETRY_MAX", defaults.retry_max),
            retry_backoff_ms: env_parsed_or("LEAGUE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
        }
    }

    pub fn clock_skew(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.clock_skew_seconds)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
