use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use clap::ValueEnum;

use crate::error::SqlRingError;
use crate::ring::RingDriver;
use crate::types::BackendKind;

use super::traits::{Conn, Driver};

/// Name -> driver map owned by the embedding application.
///
/// Build one at startup, register the backend drivers and the ring(s) that wrap
/// them, then open connections by name:
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use sql_ring::prelude::*;
/// # async fn demo(backend: Arc<dyn Driver>) -> Result<(), SqlRingError> {
/// let registry = DriverRegistry::new();
/// registry.register("sqlite", backend)?;
/// registry.register_ring_over("sqlite-ring", "sqlite")?;
/// let conn = registry.open("sqlite-ring", "primary.db;replica1.db").await?;
/// # let _ = conn;
/// # Ok(()) }
/// ```
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] if `name` is empty or already taken.
    pub fn register(&self, name: &str, driver: Arc<dyn Driver>) -> Result<(), SqlRingError> {
        if name.is_empty() {
            return Err(SqlRingError::ConfigError(
                "driver name must not be empty".to_string(),
            ));
        }
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        if drivers.contains_key(name) {
            return Err(SqlRingError::ConfigError(format!(
                "driver {name:?} is already registered"
            )));
        }
        drivers.insert(name.to_string(), driver);
        Ok(())
    }

    /// Register a ring under `name` that opens its backends through `inner`.
    ///
    /// # Errors
    /// Same as [`DriverRegistry::register`].
    pub fn register_ring(&self, name: &str, inner: Arc<dyn Driver>) -> Result<(), SqlRingError> {
        self.register(name, Arc::new(RingDriver::new(inner)))
    }

    /// Register a ring under `name` wrapping the driver already registered as `inner_name`.
    ///
    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] if `inner_name` is unknown, or the
    /// errors of [`DriverRegistry::register`].
    pub fn register_ring_over(&self, name: &str, inner_name: &str) -> Result<(), SqlRingError> {
        let inner = self.get(inner_name).ok_or_else(|| {
            SqlRingError::ConfigError(format!("unknown driver {inner_name:?}"))
        })?;
        self.register_ring(name, inner)
    }

    /// Registry holding every compiled-in backend under its name, plus a ring
    /// over it as `<name>-ring`.
    ///
    /// # Errors
    /// Propagates [`DriverRegistry::register`] errors.
    pub fn with_bundled() -> Result<Self, SqlRingError> {
        let registry = Self::new();
        for kind in BackendKind::value_variants()
            .iter()
            .filter(|k| k.is_compiled())
        {
            registry.register(kind.name(), kind.driver()?)?;
            registry.register_ring_over(&format!("{}-ring", kind.name()), kind.name())?;
        }
        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Open `dsn` with the driver registered as `name`.
    ///
    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] for an unknown driver, otherwise
    /// whatever the driver's `open` reports.
    pub async fn open(&self, name: &str, dsn: &str) -> Result<Arc<dyn Conn>, SqlRingError> {
        let driver = self
            .get(name)
            .ok_or_else(|| SqlRingError::ConfigError(format!("unknown driver {name:?}")))?;
        driver.open(dsn).await
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl BackendKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
        }
    }

    /// Whether this backend's feature was enabled at build time.
    #[must_use]
    pub fn is_compiled(self) -> bool {
        match self {
            BackendKind::Sqlite => cfg!(feature = "sqlite"),
            BackendKind::Postgres => cfg!(feature = "postgres"),
        }
    }

    /// A driver for this backend with default options.
    ///
    /// # Errors
    /// Returns [`SqlRingError::Unimplemented`] if the backend was not compiled in.
    pub fn driver(self) -> Result<Arc<dyn Driver>, SqlRingError> {
        match self {
            #[cfg(feature = "sqlite")]
            BackendKind::Sqlite => Ok(Arc::new(crate::sqlite::SqliteDriver::default())),
            #[cfg(feature = "postgres")]
            BackendKind::Postgres => Ok(Arc::new(crate::postgres::PostgresDriver::new())),
            #[allow(unreachable_patterns)]
            other => Err(SqlRingError::Unimplemented(format!(
                "{} backend not compiled in; enable the `{}` feature",
                other.name(),
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock::MockDriver;

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = DriverRegistry::new();
        let mock = MockDriver::new();
        registry.register("mock", mock.driver()).unwrap();
        let err = registry.register("mock", mock.driver()).unwrap_err();
        assert!(matches!(err, SqlRingError::ConfigError(_)));
    }

    #[test]
    fn ring_over_unknown_inner_fails() {
        let registry = DriverRegistry::new();
        assert!(registry.register_ring_over("ring", "missing").is_err());
        assert!(registry.names().is_empty());
    }

    #[tokio::test]
    async fn ring_registered_by_name_opens_every_backend() -> Result<(), SqlRingError> {
        let registry = DriverRegistry::new();
        let mock = MockDriver::new();
        registry.register("mock", mock.driver())?;
        registry.register_ring_over("mock-ring", "mock")?;
        assert_eq!(registry.names(), vec!["mock", "mock-ring"]);

        let _conn = registry.open("mock-ring", "a;b;c").await?;
        assert_eq!(mock.open_connections(), 3);
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn bundled_backends_register_with_their_rings() {
        let registry = DriverRegistry::with_bundled().unwrap();
        let names = registry.names();
        assert!(names.contains(&"sqlite".to_string()));
        assert!(names.contains(&"sqlite-ring".to_string()));
        assert_eq!(
            BackendKind::from_str("SQLITE", true).map(BackendKind::name),
            Ok("sqlite")
        );
    }
}
