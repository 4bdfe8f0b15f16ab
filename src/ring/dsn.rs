use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SqlRingError;

/// Separator between backend DSNs in a ring connection string.
pub const DSN_SEPARATOR: char = ';';

static KEY_VALUE_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password\s*=\s*)[^\s;]+").expect("static regex")
});

static URL_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(://[^:/@\s]+):[^@\s]+@").expect("static regex")
});

/// Topology of one ring: exactly one primary, zero or more replicas in routing order.
///
/// ```rust
/// use sql_ring::prelude::*;
///
/// let cfg: RingConfig = "a.db;b.db;c.db".parse()?;
/// assert_eq!(cfg.primary, "a.db");
/// assert_eq!(cfg.replicas, vec!["b.db", "c.db"]);
/// assert_eq!(cfg.to_dsn_list(), "a.db;b.db;c.db");
/// # Ok::<(), SqlRingError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    pub primary: String,
    #[serde(default)]
    pub replicas: Vec<String>,
}

impl RingConfig {
    #[must_use]
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            replicas: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_replica(mut self, dsn: impl Into<String>) -> Self {
        self.replicas.push(dsn.into());
        self
    }

    /// Split a `;`-separated DSN list. Position 0 is the primary.
    ///
    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] if the list is empty or contains an
    /// empty entry.
    pub fn parse(raw: &str) -> Result<Self, SqlRingError> {
        let mut entries = raw.split(DSN_SEPARATOR).map(str::trim);
        let primary = entries.next().unwrap_or_default().to_string();
        let cfg = Self {
            primary,
            replicas: entries.map(str::to_string).collect(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] for empty DSNs or DSNs containing
    /// the separator (which cannot be escaped).
    pub fn validate(&self) -> Result<(), SqlRingError> {
        if self.primary.is_empty() {
            return Err(SqlRingError::ConfigError(
                "primary DSN is required".to_string(),
            ));
        }
        for (i, dsn) in std::iter::once(&self.primary)
            .chain(&self.replicas)
            .enumerate()
        {
            if dsn.is_empty() {
                return Err(SqlRingError::ConfigError(format!(
                    "DSN at position {i} is empty"
                )));
            }
            if dsn.contains(DSN_SEPARATOR) {
                return Err(SqlRingError::ConfigError(format!(
                    "DSN at position {i} contains {DSN_SEPARATOR:?}, which cannot be escaped"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn to_dsn_list(&self) -> String {
        std::iter::once(self.primary.as_str())
            .chain(self.replicas.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(&DSN_SEPARATOR.to_string())
    }

    /// Primary plus replicas.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        1 + self.replicas.len()
    }
}

impl FromStr for RingConfig {
    type Err = SqlRingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact_dsn(&self.to_dsn_list()))
    }
}

/// Mask passwords in key/value (`password=...`) and URL (`user:pass@host`) DSNs.
#[must_use]
pub fn redact_dsn(dsn: &str) -> Cow<'_, str> {
    match KEY_VALUE_PASSWORD.replace_all(dsn, "${1}***") {
        Cow::Borrowed(_) => URL_PASSWORD.replace_all(dsn, "${1}:***@"),
        Cow::Owned(masked) => Cow::Owned(
            URL_PASSWORD
                .replace_all(&masked, "${1}:***@")
                .into_owned(),
        ),
    }
}
