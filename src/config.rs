//! Configuration for the database connection
//!
//! Provides a builder pattern for configuring the connection pool, plus
//! environment loading (`.env` files are honoured through `dotenvy`).

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{OrmError, Result};

/// Configuration for connecting to PostgreSQL
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Server host name (default: "localhost")
    pub host: String,
    /// Server port (default: 5432)
    pub port: u16,
    /// Role used to log in
    pub user: String,
    /// Password for `user`, if the server requires one
    pub password: Option<String>,
    /// Database name
    pub database: String,
    /// Require TLS instead of a plain connection (default: false)
    pub require_ssl: bool,
    /// Upper bound on pooled connections (default: 10)
    pub max_connections: u32,
    /// Full connection URL; when set it overrides the individual parts
    pub database_url: Option<String>,
}

impl DatabaseConfig {
    /// Create a new configuration builder
    pub fn builder(user: impl Into<String>, database: impl Into<String>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new(user, database)
    }

    /// Configuration from a full connection URL
    pub fn from_url(url: impl Into<String>) -> Self {
        DatabaseConfigBuilder::new("", "").url(url).build()
    }

    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// `DATABASE_URL` wins when set; otherwise `DB_HOST`, `DB_PORT`,
    /// `DB_USER`, `DB_PASSWORD` and `DB_NAME` are read.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            return Ok(Self::from_url(url));
        }

        let user = lookup("DB_USER")
            .ok_or_else(|| OrmError::validation("DB_USER or DATABASE_URL must be set"))?;
        let database = lookup("DB_NAME")
            .ok_or_else(|| OrmError::validation("DB_NAME or DATABASE_URL must be set"))?;

        let mut builder = DatabaseConfigBuilder::new(user, database);
        if let Some(host) = lookup("DB_HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = lookup("DB_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|_| OrmError::validation(format!("Invalid DB_PORT '{}'", port)))?;
            builder = builder.port(port);
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            builder = builder.password(password);
        }

        Ok(builder.build())
    }

    /// Connection options for sqlx
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.database_url {
            return url
                .parse::<PgConnectOptions>()
                .map_err(|e| OrmError::connection(format!("Invalid database URL: {}", e)));
        }

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .ssl_mode(if self.require_ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Disable
            });
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }
}

/// Builder for DatabaseConfig
#[derive(Debug)]
pub struct DatabaseConfigBuilder {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    database: String,
    require_ssl: bool,
    max_connections: u32,
    database_url: Option<String>,
}

impl DatabaseConfigBuilder {
    /// Create a new builder for the given role and database
    pub fn new(user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: user.into(),
            password: None,
            database: database.into(),
            require_ssl: false,
            max_connections: 10,
            database_url: None,
        }
    }

    /// Set the server host (default: "localhost")
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port (default: 5432)
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Require TLS (default: false)
    pub fn require_ssl(mut self, enabled: bool) -> Self {
        self.require_ssl = enabled;
        self
    }

    /// Set the maximum pool size (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Use a full connection URL instead of the individual parts
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            database: self.database,
            require_ssl: self.require_ssl,
            max_connections: self.max_connections,
            database_url: self.database_url,
        }
    }
}
