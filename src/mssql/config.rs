use std::time::Duration;

use tiberius::{AuthMethod, Config as TiberiusConfig};

use crate::error::SqlFluentError;

const DEFAULT_PORT: u16 = 1433;

/// Where and how to connect to SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub application_name: Option<String>,
    pub trust_cert: bool,
    pub connect_timeout: Option<Duration>,
    // Parsed ADO.NET connection string, when the options came from one
    ado: Option<String>,
}

impl MssqlOptions {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port: None,
            instance_name: None,
            application_name: None,
            trust_cert: true,
            connect_timeout: Some(Duration::from_secs(15)),
            ado: None,
        }
    }

    /// Options from an ADO.NET style connection string, e.g.
    /// `server=tcp:localhost,1433;database=app;user=sa;password=...;TrustServerCertificate=true`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` if the string cannot be parsed.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, SqlFluentError> {
        TiberiusConfig::from_ado_string(connection_string).map_err(|e| {
            SqlFluentError::ConfigError(format!("Invalid connection string: {e}"))
        })?;
        let mut options = Self::new(String::new(), String::new(), String::new(), String::new());
        options.trust_cert = false;
        options.ado = Some(connection_string.to_string());
        Ok(options)
    }

    #[must_use]
    pub fn builder(server: String, database: String, user: String, password: String) -> MssqlOptionsBuilder {
        MssqlOptionsBuilder::new(server, database, user, password)
    }

    /// Address used for display and logging.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.ado {
            Some(_) => "<connection string>".to_string(),
            None => format!(
                "{}:{}/{}",
                self.server,
                self.port.unwrap_or(DEFAULT_PORT),
                self.database
            ),
        }
    }

    /// Translate into a tiberius configuration.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` if a stored connection string no
    /// longer parses.
    pub fn to_tiberius_config(&self) -> Result<TiberiusConfig, SqlFluentError> {
        if let Some(ado) = &self.ado {
            return TiberiusConfig::from_ado_string(ado).map_err(|e| {
                SqlFluentError::ConfigError(format!("Invalid connection string: {e}"))
            });
        }

        let mut config = TiberiusConfig::new();
        config.host(&self.server);
        config.database(&self.database);
        config.port(self.port.unwrap_or(DEFAULT_PORT));
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if let Some(instance) = &self.instance_name {
            config.instance_name(instance);
        }
        if let Some(application) = &self.application_name {
            config.application_name(application);
        }
        if self.trust_cert {
            config.trust_cert();
        }
        Ok(config)
    }
}

/// Fluent builder for [`MssqlOptions`].
#[derive(Debug, Clone)]
pub struct MssqlOptionsBuilder {
    opts: MssqlOptions,
}

impl MssqlOptionsBuilder {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            opts: MssqlOptions::new(server, database, user, password),
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.opts.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn application_name(mut self, application_name: Option<String>) -> Self {
        self.opts.application_name = application_name;
        self
    }

    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.opts.trust_cert = trust_cert;
        self
    }

    /// `None` waits for the TCP connect and login as long as the OS allows.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.opts.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlOptions {
        self.opts
    }
}
