//! Loading, validation, and mtime-based hot reload of the declared target set.
//!
//! Two independent JSON documents make up one `ConfigSet`: `websites.json` and
//! `databases.json`. Each family is parsed and validated on its own; a broken
//! document in one family never prevents the other from loading.

use super::{DatabaseTarget, Target, WebsiteTarget};
use crate::error::ConfigError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use url::Url;

const WEBSITES_FILE: &str = "websites.json";
const DATABASES_FILE: &str = "databases.json";

/// The target set for one configuration generation, plus the per-family counts
/// the supervisor records in `config_reloaded` journal entries.
#[derive(Debug, Clone, Default)]
pub struct ConfigSet {
    pub targets: Vec<Target>,
    pub website_count: usize,
    pub database_count: usize,
}

impl ConfigSet {
    fn new(websites: Vec<WebsiteTarget>, databases: Vec<DatabaseTarget>) -> Self {
        let website_count = websites.len();
        let database_count = databases.len();
        let mut targets: Vec<Target> = websites.into_iter().map(Target::Http).collect();
        targets.extend(databases.into_iter().map(Target::Database));
        Self {
            targets,
            website_count,
            database_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Outcome of a tick-boundary reload attempt.
pub enum ReloadOutcome {
    /// Neither file's mtime changed since the last check.
    Unchanged,
    /// At least one file changed and the (possibly partial) reload succeeded.
    Reloaded(ConfigSet),
    /// A file changed but failed to parse/validate; the caller should keep the
    /// previous `ConfigSet` and log a `config_reload_error` record.
    Error(String),
}

pub struct ConfigSource {
    config_dir: PathBuf,
    websites_mtime: Option<SystemTime>,
    databases_mtime: Option<SystemTime>,
}

impl ConfigSource {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            websites_mtime: None,
            databases_mtime: None,
        }
    }

    fn websites_path(&self) -> PathBuf {
        self.config_dir.join(WEBSITES_FILE)
    }

    fn databases_path(&self) -> PathBuf {
        self.config_dir.join(DATABASES_FILE)
    }

    /// Load both families for process startup. Each family's failure is caught
    /// independently; the caller decides whether an overall-empty result is fatal.
    pub fn load_initial(&mut self) -> ConfigSet {
        let websites = match self.load_website_config() {
            Ok(sites) => sites,
            Err(e) => {
                eprintln!("[WARNING] website configuration not loaded: {e}");
                Vec::new()
            }
        };
        let databases = match self.load_database_config() {
            Ok(dbs) => dbs,
            Err(e) => {
                eprintln!("[WARNING] database configuration not loaded: {e}");
                Vec::new()
            }
        };
        self.websites_mtime = mtime_of(&self.websites_path());
        self.databases_mtime = mtime_of(&self.databases_path());

        if let Err(e) = validate_unique_names(&websites, &databases) {
            eprintln!("[WARNING] configuration rejected: {e}");
            return ConfigSet::default();
        }
        ConfigSet::new(websites, databases)
    }

    /// Check whether either file's mtime advanced since the last check/load; if
    /// so, reload and validate both documents and report the outcome.
    pub fn check_and_reload(&mut self, previous: &ConfigSet) -> ReloadOutcome {
        let websites_mtime = mtime_of(&self.websites_path());
        let databases_mtime = mtime_of(&self.databases_path());

        if websites_mtime == self.websites_mtime && databases_mtime == self.databases_mtime {
            return ReloadOutcome::Unchanged;
        }

        let websites = match self.load_website_config() {
            Ok(sites) => sites,
            Err(ConfigError::NotFound(_)) => Vec::new(),
            Err(e) => return ReloadOutcome::Error(e.to_string()),
        };
        let databases = match self.load_database_config() {
            Ok(dbs) => dbs,
            Err(ConfigError::NotFound(_)) => Vec::new(),
            Err(e) => return ReloadOutcome::Error(e.to_string()),
        };

        self.websites_mtime = websites_mtime;
        self.databases_mtime = databases_mtime;

        if let Err(e) = validate_unique_names(&websites, &databases) {
            return ReloadOutcome::Error(e);
        }

        if websites.is_empty() && databases.is_empty() && !previous.is_empty() {
            return ReloadOutcome::Error("reload produced an empty target set".to_string());
        }

        ReloadOutcome::Reloaded(ConfigSet::new(websites, databases))
    }

    pub fn load_website_config(&self) -> Result<Vec<WebsiteTarget>, ConfigError> {
        let path = self.websites_path();
        let raw = read_json(&path)?;
        validate_website_config(&raw).map_err(ConfigError::Validation)?;
        let websites = raw
            .get("websites")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(websites.len());
        for site in websites {
            let target: WebsiteTarget =
                serde_json::from_value(site).map_err(|e| ConfigError::InvalidJson {
                    path: path.clone(),
                    source: e,
                })?;
            out.push(target);
        }
        Ok(out)
    }

    pub fn load_database_config(&self) -> Result<Vec<DatabaseTarget>, ConfigError> {
        let path = self.databases_path();
        let raw = read_json(&path)?;
        validate_database_config(&raw).map_err(ConfigError::Validation)?;
        let databases = raw
            .get("databases")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(databases.len());
        for db in databases {
            let target: DatabaseTarget =
                serde_json::from_value(db).map_err(|e| ConfigError::InvalidJson {
                    path: path.clone(),
                    source: e,
                })?;
            out.push(target);
        }
        Ok(out)
    }
}

/// Two targets may not share a name within one configuration (§3): the name
/// is the shared key `StateTracker`/`CircuitBreakerRegistry` index by, so a
/// collision — even across the website/database families — would silently
/// alias two distinct targets onto one tracked identity.
fn validate_unique_names(websites: &[WebsiteTarget], databases: &[DatabaseTarget]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for name in websites
        .iter()
        .map(|w| w.name.as_str())
        .chain(databases.iter().map(|d| d.name.as_str()))
    {
        if !seen.insert(name) {
            return Err(format!(
                "duplicate target name \"{name}\": names must be unique across websites and databases"
            ));
        }
    }
    Ok(())
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| ConfigError::InvalidJson {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Structural + semantic validation per SPEC_FULL.md §6: unknown fields are
/// ignored (we only inspect the fields we care about), but every field that is
/// present must conform to its type and range.
fn validate_website_config(config: &Value) -> Result<(), String> {
    let websites = config
        .get("websites")
        .ok_or_else(|| "missing \"websites\" key".to_string())?;
    let websites = websites
        .as_array()
        .ok_or_else(|| "\"websites\" must be an array".to_string())?;

    let mut seen_names = std::collections::HashSet::new();
    for site in websites {
        let obj = site
            .as_object()
            .ok_or_else(|| "each website entry must be an object".to_string())?;

        let name = non_empty_string(obj, "name")?;
        if !seen_names.insert(name.clone()) {
            return Err(format!("duplicate website name \"{name}\""));
        }
        let url = non_empty_string(obj, "url")?;
        if !is_valid_http_url(&url) {
            return Err(format!("invalid website url for \"{name}\": {url}"));
        }

        if let Some(timeout) = obj.get("timeout") {
            let t = timeout
                .as_i64()
                .ok_or_else(|| format!("\"timeout\" for \"{name}\" must be an integer"))?;
            if t <= 0 {
                return Err(format!("\"timeout\" for \"{name}\" must be > 0"));
            }
        }

        if let Some(status) = obj.get("expected_status") {
            let s = status
                .as_i64()
                .ok_or_else(|| format!("\"expected_status\" for \"{name}\" must be an integer"))?;
            if !(100..=599).contains(&s) {
                return Err(format!(
                    "\"expected_status\" for \"{name}\" must be in [100, 599]"
                ));
            }
        }
    }
    Ok(())
}

fn validate_database_config(config: &Value) -> Result<(), String> {
    let databases = config
        .get("databases")
        .ok_or_else(|| "missing \"databases\" key".to_string())?;
    let databases = databases
        .as_array()
        .ok_or_else(|| "\"databases\" must be an array".to_string())?;

    const REQUIRED_STRINGS: [&str; 5] = ["name", "host", "database", "username", "password"];
    const VALID_SSL_MODES: [&str; 6] = [
        "disable",
        "allow",
        "prefer",
        "require",
        "verify-ca",
        "verify-full",
    ];

    let mut seen_names = std::collections::HashSet::new();
    for db in databases {
        let obj = db
            .as_object()
            .ok_or_else(|| "each database entry must be an object".to_string())?;

        for field in REQUIRED_STRINGS {
            non_empty_string(obj, field)?;
        }
        let name = non_empty_string(obj, "name")?;
        if !seen_names.insert(name.clone()) {
            return Err(format!("duplicate database name \"{name}\""));
        }

        let port = obj
            .get("port")
            .ok_or_else(|| format!("missing \"port\" for \"{name}\""))?
            .as_i64()
            .ok_or_else(|| format!("\"port\" for \"{name}\" must be an integer"))?;
        if !(1..=65535).contains(&port) {
            return Err(format!("\"port\" for \"{name}\" must be in [1, 65535]"));
        }

        if let Some(sslmode) = obj.get("sslmode") {
            let mode = sslmode
                .as_str()
                .ok_or_else(|| format!("\"sslmode\" for \"{name}\" must be a string"))?;
            if !VALID_SSL_MODES.contains(&mode) {
                return Err(format!("\"sslmode\" for \"{name}\" is not a recognized mode"));
            }
        }
    }
    Ok(())
}

fn non_empty_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, String> {
    let value = obj
        .get(field)
        .ok_or_else(|| format!("missing \"{field}\""))?
        .as_str()
        .ok_or_else(|| format!("\"{field}\" must be a string"))?;
    if value.trim().is_empty() {
        return Err(format!("\"{field}\" must not be empty"));
    }
    Ok(value.to_string())
}

fn is_valid_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}
