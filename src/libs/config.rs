use std::fs;
use std::path::Path;

use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

use crate::libs::error::{OrmError, Result};

/// Connection pool settings.
///
/// `user`, `password` and `database` have no default and must be present
/// before the pool is created. Everything else falls back to the defaults
/// below when missing from a config file.
///
/// ```toml
/// user = "www-data"
/// password = "www-data"
/// database = "awesome"
/// max_pool_size = 20
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "db")]
    pub database: Option<String>,
    pub charset: String,
    pub autocommit: bool,
    #[serde(alias = "maxsize")]
    pub max_pool_size: u32,
    #[serde(alias = "minsize")]
    pub min_pool_size: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            user: None,
            password: None,
            database: None,
            charset: "utf8".into(),
            autocommit: true,
            max_pool_size: 10,
            min_pool_size: 10,
        }
    }
}

impl PoolConfig {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
            database: Some(database.into()),
            ..Self::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OrmError::config(format!("invalid pool config: {e}")))
    }

    /// Read settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| OrmError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check that required options are present and sizes are sane.
    pub fn validate(&self) -> Result<()> {
        for (option, value) in [
            ("user", &self.user),
            ("password", &self.password),
            ("database", &self.database),
        ] {
            if value.is_none() {
                return Err(OrmError::config(format!("missing required option '{option}'")));
            }
        }
        if self.max_pool_size == 0 {
            return Err(OrmError::config("max_pool_size must be at least 1"));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(OrmError::config(format!(
                "min_pool_size ({}) exceeds max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }
        Ok(())
    }

    pub(crate) fn connect_options(&self) -> Result<MySqlConnectOptions> {
        self.validate()?;
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .charset(&self.charset);
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        Ok(options)
    }
}
