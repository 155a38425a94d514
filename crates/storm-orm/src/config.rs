//! Connection and pool configuration.
//!
//! Both types deserialize with serde, so they can be loaded from a JSON
//! configuration file:
//!
//! ```
//! use storm_orm::PoolSettings;
//!
//! let settings = PoolSettings::from_json(
//!     r#"{ "connection": { "database": "app.db" }, "count": 4 }"#,
//! ).unwrap();
//! assert_eq!(settings.count, 4);
//! assert_eq!(settings.lifetime, 3600);
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{OrmError, Result};

/// Parameters used to open a backend connection.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: Option<u16>,
    /// Database (schema) name. For SQLite this is the file path or `:memory:`.
    pub database: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: None,
            database: None,
            user: None,
            password: None,
        }
    }
}

impl ConnectionParams {
    /// Creates parameters for the given database name.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    /// Sets the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the database name, or an error if none was configured.
    pub fn database_name(&self) -> Result<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| OrmError::Configuration(String::from("no database name configured")))
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Parameters for every connection the pool creates.
    pub connection: ConnectionParams,
    /// Maximum number of connections.
    pub count: usize,
    /// Maximum connection age in seconds.
    pub lifetime: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            count: 10,
            lifetime: 3600,
        }
    }
}

impl PoolSettings {
    /// Creates settings with the default size and lifetime.
    #[must_use]
    pub fn new(connection: ConnectionParams) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    /// Sets the maximum number of connections.
    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the maximum connection age in seconds.
    #[must_use]
    pub const fn lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = seconds;
        self
    }

    /// Returns the lifetime as a duration.
    #[must_use]
    pub const fn lifetime_duration(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }

    /// Parses settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| OrmError::Configuration(e.to_string()))
    }
}
