//! Target declarations: the two families of monitored endpoints.

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{ConfigSet, ConfigSource};

/// A declared HTTP endpoint to probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_timeout() -> u32 {
    10
}

fn default_expected_status() -> u16 {
    200
}

/// `sslmode` as accepted by PostgreSQL connection strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl Default for SslMode {
    fn default() -> Self {
        SslMode::Prefer
    }
}

/// A declared database instance to probe with `SELECT 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub sslmode: SslMode,
}

/// The closed sum the scheduler dispatches uniformly via `Prober::probe`.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Http(WebsiteTarget),
    Database(DatabaseTarget),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Http(t) => &t.name,
            Target::Database(t) => &t.name,
        }
    }

    pub fn target_type(&self) -> crate::core::types::TargetType {
        match self {
            Target::Http(_) => crate::core::types::TargetType::Website,
            Target::Database(_) => crate::core::types::TargetType::Database,
        }
    }
}
