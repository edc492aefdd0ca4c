use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,

    // Payroll
    /// Gross amount given to auto-selected employees.
    pub payroll_default_gross: f64,
    pub department_cache_ttl_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads configuration from the environment; call `dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let payroll_default_gross: f64 = parsed("PAYROLL_DEFAULT_GROSS", 5000.0)?;
        if !payroll_default_gross.is_finite() || payroll_default_gross <= 0.0 {
            anyhow::bail!("PAYROLL_DEFAULT_GROSS must be a positive amount");
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,

            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            payroll_default_gross,
            department_cache_ttl_secs: parsed("DEPARTMENT_CACHE_TTL_SECS", 300)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: String::new(),
            db_max_connections: 1,
            jwt_secret: jwt_secret.to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            log_dir: "logs".to_string(),
            payroll_default_gross: 5000.0,
            department_cache_ttl_secs: 60,
        }
    }
}
