use anyhow::{Context, Result};

/// Runtime configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Scheduled decision-cycle interval in seconds.
    pub control_interval_secs: u64,
    /// Rolling window for alert deduplication in seconds. Defaults to the
    /// control interval so one ongoing breach alerts at most once per cycle.
    pub alert_dedup_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let control_interval_secs: u64 = optional("CONTROL_INTERVAL_SECS", "300")
            .parse()
            .context("CONTROL_INTERVAL_SECS must be a positive integer")?;

        let alert_dedup_secs = match std::env::var("ALERT_DEDUP_SECS") {
            Ok(raw) => raw
                .parse()
                .context("ALERT_DEDUP_SECS must be a non-negative integer")?,
            Err(_) => control_interval_secs,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            control_interval_secs,
            alert_dedup_secs,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
