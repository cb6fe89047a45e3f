use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::error::{ChromaError, Result};

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the static API token.
pub const TOKEN_HEADER: &str = "x-chroma-token";

/// Connection configuration for a Chroma server.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub tenant: String,
    pub database: String,
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            headers: BTreeMap::new(),
        }
    }

    /// Build configuration from environment variables:
    /// `CHROMA_URL`, `CHROMA_TENANT` (optional, default `default_tenant`),
    /// `CHROMA_DATABASE` (optional, default `default_database`),
    /// `CHROMA_TIMEOUT_SECS` (optional, default 30), `CHROMA_TOKEN` (optional).
    pub fn from_env() -> Result<Self> {
        let base_url = require_env("CHROMA_URL")?;
        let tenant = env::var("CHROMA_TENANT").unwrap_or_else(|_| DEFAULT_TENANT.to_string());
        let database =
            env::var("CHROMA_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let timeout = parse_env("CHROMA_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut config = Self {
            base_url,
            tenant,
            database,
            timeout: Duration::from_secs(timeout),
            headers: BTreeMap::new(),
        };
        if let Ok(token) = env::var("CHROMA_TOKEN") {
            config.set_token(token);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.headers.insert(TOKEN_HEADER.to_string(), token.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ChromaError::Config("base_url must not be empty".into()));
        }
        if self.tenant.is_empty() {
            return Err(ChromaError::Config("tenant must not be empty".into()));
        }
        if self.database.is_empty() {
            return Err(ChromaError::Config("database must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ChromaError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| ChromaError::Config(format!("missing env: {key}")))
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
