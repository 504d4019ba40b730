use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;

#[derive(Clone, Debug, Parser)]
#[clap(name = "loyalty", version)]
pub struct AppConfig {
    /// Database connection string.
    #[clap(
        short = 'd',
        long,
        env = "DATABASE_URI",
        default_value = "sqlite://loyalty_dev.db?mode=rwc"
    )]
    pub database_uri: String,

    /// Upper bound on pooled database connections.
    #[clap(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 16)]
    pub db_max_connections: u32,

    /// Drop and recreate all tables on startup.
    #[clap(long, env = "RELOAD_TABLES")]
    pub reload_tables: bool,

    // =========================
    // Accrual service
    // =========================
    /// Address of the accrual calculation service, `host:port` or
    /// `http://host:port`.
    #[clap(
        short = 'r',
        long,
        env = "ACCRUAL_SYSTEM_ADDRESS",
        default_value = "http://127.0.0.1:8090"
    )]
    pub accrual_system_address: String,

    /// Per-request timeout against the accrual service. A timed-out request
    /// counts as a failed poll and is retried next cycle.
    #[clap(long, env = "ACCRUAL_REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    pub request_timeout_ms: u64,

    // =========================
    // Reconciliation loop
    // =========================
    /// Pause between the end of one reconciliation cycle and the start of the
    /// next.
    #[clap(long, env = "ACCRUAL_POLL_INTERVAL_MS", default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Maximum number of in-flight requests to the accrual service.
    ///
    /// Independent of how many orders are pending: a backlog of 10k orders
    /// is still polled through this many workers.
    #[clap(long, env = "ACCRUAL_WORKERS", default_value_t = 8)]
    pub workers: usize,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        self.accrual_base_url()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn accrual_base_url(&self) -> Result<String, ConfigError> {
        normalize_base_url(&self.accrual_system_address)
    }
}

/// Turns `host:port` or `scheme://host:port[/]` into `scheme://host:port`.
/// A missing scheme defaults to `http`.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidAddress(raw.to_string());

    let trimmed = raw.trim().trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((s, rest)) if s == "http" || s == "https" => (s, rest),
        Some(_) => return Err(invalid()),
        None => ("http", trimmed),
    };

    if rest.is_empty() || rest.contains('/') {
        return Err(invalid());
    }

    let (host, port) = match rest.rsplit_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (rest, None),
    };

    if !is_valid_host(host) {
        return Err(invalid());
    }

    match port {
        Some(p) => {
            let port: u16 = p.parse().map_err(|_| invalid())?;
            Ok(format!("{scheme}://{host}:{port}"))
        }
        None => Ok(format!("{scheme}://{host}")),
    }
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() || host == "localhost" {
        return true;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}
