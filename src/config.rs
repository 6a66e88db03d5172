use std::{collections::HashMap, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};

use crate::ambient::DEFAULT_BASE_URL;

/// One week.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Config {
    pub application_key: String,
    pub api_key: String,
    pub ambient_base_url: String,
    /// Minutes between poll cycles, 1..=`MAX_POLL_INTERVAL_MINUTES`.
    pub poll_interval_minutes: u64,
    pub server_host: String,
    pub http_port: u16,
    /// Display-only replacement for the stored device location.
    pub device_location: Option<String>,
    pub database: DatabaseConfig,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        let poll_interval_minutes: u64 = env.parsed("POLL_INTERVAL_MINUTES", 5)?;
        if poll_interval_minutes < 1 {
            bail!("POLL_INTERVAL_MINUTES must be at least 1 minute, got {poll_interval_minutes}");
        }
        if poll_interval_minutes > MAX_POLL_INTERVAL_MINUTES {
            bail!(
                "POLL_INTERVAL_MINUTES must be at most {MAX_POLL_INTERVAL_MINUTES} minutes, got {poll_interval_minutes}"
            );
        }

        Ok(Self {
            application_key: env.required("APPLICATION_KEY")?,
            api_key: env.required("API_KEY")?,
            ambient_base_url: env.optional("AMBIENT_BASE_URL", DEFAULT_BASE_URL),
            poll_interval_minutes,
            server_host: env.optional("SERVER_HOST", "0.0.0.0"),
            http_port: env.parsed("HTTP_PORT", 3000)?,
            device_location: env.get("DEVICE_LOCATION"),
            database: DatabaseConfig {
                host: env.optional("POSTGRES_HOST", "localhost"),
                port: env.parsed("POSTGRES_PORT", 5432)?,
                database: env.optional("POSTGRES_DB", "ambient_weather"),
                user: env.optional("POSTGRES_USER", "postgres"),
                password: env.optional("POSTGRES_PASSWORD", "postgres"),
            },
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }
}

// Keys and passwords stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ambient_base_url", &self.ambient_base_url)
            .field("poll_interval_minutes", &self.poll_interval_minutes)
            .field("server_host", &self.server_host)
            .field("http_port", &self.http_port)
            .field("device_location", &self.device_location)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Value of `key`, treating an empty string as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("missing required env var: {key}"))
    }

    fn optional(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn minimal() -> HashMap<String, String> {
        vars(&[("APPLICATION_KEY", "app"), ("API_KEY", "api")])
    }

    #[test]
    fn defaults_apply_when_only_keys_are_set() {
        let c = Config::from_map(&minimal()).unwrap();
        assert_eq!(c.application_key, "app");
        assert_eq!(c.api_key, "api");
        assert_eq!(c.ambient_base_url, DEFAULT_BASE_URL);
        assert_eq!(c.poll_interval_minutes, 5);
        assert_eq!(c.poll_interval(), Duration::from_secs(300));
        assert_eq!(c.server_host, "0.0.0.0");
        assert_eq!(c.http_port, 3000);
        assert_eq!(c.device_location, None);
        assert_eq!(c.database.host, "localhost");
        assert_eq!(c.database.port, 5432);
        assert_eq!(c.database.database, "ambient_weather");
        assert_eq!(c.database.user, "postgres");
        assert_eq!(c.database.password, "postgres");
    }

    #[test]
    fn missing_application_key_errors() {
        let err = Config::from_map(&vars(&[("API_KEY", "api")])).unwrap_err();
        assert!(err.to_string().contains("APPLICATION_KEY"));
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let err =
            Config::from_map(&vars(&[("APPLICATION_KEY", "app"), ("API_KEY", "")])).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn poll_interval_below_one_minute_errors() {
        let mut v = minimal();
        v.insert("POLL_INTERVAL_MINUTES".into(), "0".into());
        let err = Config::from_map(&v).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn poll_interval_above_one_week_errors() {
        let mut v = minimal();
        v.insert("POLL_INTERVAL_MINUTES".into(), "307445734561825861".into());
        let err = Config::from_map(&v).unwrap_err();
        assert!(err.to_string().contains("at most"));

        v.insert("POLL_INTERVAL_MINUTES".into(), MAX_POLL_INTERVAL_MINUTES.to_string());
        let c = Config::from_map(&v).unwrap();
        assert_eq!(c.poll_interval(), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn unparsable_numbers_error_with_key_name() {
        let mut v = minimal();
        v.insert("HTTP_PORT".into(), "eighty".into());
        let err = Config::from_map(&v).unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT"));

        let mut v = minimal();
        v.insert("POLL_INTERVAL_MINUTES".into(), "-3".into());
        assert!(Config::from_map(&v).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let mut v = minimal();
        for (k, val) in [
            ("POLL_INTERVAL_MINUTES", "1"),
            ("HTTP_PORT", "8080"),
            ("DEVICE_LOCATION", "Rooftop"),
            ("AMBIENT_BASE_URL", "http://localhost:9999/v1"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DB", "weather"),
            ("POSTGRES_USER", "relay"),
            ("POSTGRES_PASSWORD", "secret"),
        ] {
            v.insert(k.into(), val.into());
        }

        let c = Config::from_map(&v).unwrap();
        assert_eq!(c.poll_interval_minutes, 1);
        assert_eq!(c.http_port, 8080);
        assert_eq!(c.device_location.as_deref(), Some("Rooftop"));
        assert_eq!(c.ambient_base_url, "http://localhost:9999/v1");
        assert_eq!(c.database.host, "db");
        assert_eq!(c.database.port, 6543);
        assert_eq!(c.database.database, "weather");
        assert_eq!(c.database.user, "relay");
        assert_eq!(c.database.password, "secret");
    }

    #[test]
    fn empty_device_location_is_no_override() {
        let mut v = minimal();
        v.insert("DEVICE_LOCATION".into(), "  ".into());
        assert_eq!(Config::from_map(&v).unwrap().device_location, None);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut v = minimal();
        v.insert("POSTGRES_PASSWORD".into(), "hunter2".into());
        let out = format!("{:?}", Config::from_map(&v).unwrap());
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("\"api\""));
    }
}
