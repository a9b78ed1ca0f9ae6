// Copyright 2020 Joyent, Inc.

use std::sync::Arc;

use postgres::error::SqlState;
use postgres::{Client, Config, NoTls};
use thiserror::Error;

use dbpool::config::ConfigStore;
use dbpool::connection::{
    Connection, DriverError, ACCESS_DENIED, BAD_DB, DB_ACCESS_DENIED,
};

/// The server could not be reached or the session is not connected.
pub const CONNECTION_FAILED: u32 = 2002;
/// The connection parameters in the configuration store are unusable.
pub const BAD_CONFIG: u32 = 2005;
/// Any other error reported by the server.
pub const SERVER_ERROR: u32 = 1105;

#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("not connected")]
    NotConnected,
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Postgres(#[from] postgres::Error),
}

impl DriverError for PostgresError {
    fn errno(&self) -> u32 {
        match self {
            PostgresError::NotConnected => CONNECTION_FAILED,
            PostgresError::InvalidConfig(_) => BAD_CONFIG,
            PostgresError::Postgres(err) => sqlstate_errno(err.code()),
        }
    }
}

/// Map a SQLSTATE onto the error codes the pool classifies. Errors without
/// a SQLSTATE come from the client side, usually a failed socket.
pub fn sqlstate_errno(code: Option<&SqlState>) -> u32 {
    match code {
        None => CONNECTION_FAILED,
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            ACCESS_DENIED
        }
        Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => {
            DB_ACCESS_DENIED
        }
        Some(code) if *code == SqlState::INVALID_CATALOG_NAME => BAD_DB,
        Some(_) => SERVER_ERROR,
    }
}

pub struct PostgresConnection {
    pub connection: Option<Client>,
    config: Arc<dyn ConfigStore>,
    application_name: Option<String>,
}

impl PostgresConnection {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        application_name: Option<String>,
    ) -> Self {
        PostgresConnection {
            connection: None,
            config,
            application_name,
        }
    }

    /// The underlying client, if the session is connected.
    pub fn client(&mut self) -> Option<&mut Client> {
        self.connection.as_mut()
    }

    /// A factory suitable for `Pool::new`. Every session reads its
    /// parameters from `config` when the pool connects it.
    pub fn connection_creator(
        config: Arc<dyn ConfigStore>,
        application_name: Option<String>,
    ) -> impl Fn() -> PostgresConnection + Send + Sync + 'static {
        move || {
            PostgresConnection::new(config.clone(), application_name.clone())
        }
    }
}

impl Connection for PostgresConnection {
    type Error = PostgresError;

    fn connect(&mut self, config_key: &str) -> Result<(), Self::Error> {
        self.connection = None;

        let mut config = PostgresConnectionConfig::from_store(
            self.config.as_ref(),
            config_key,
        )?;
        if config.application_name.is_none() {
            config.application_name = self.application_name.clone();
        }

        let connection = Config::from(config).connect(NoTls)?;
        self.connection = Some(connection);
        Ok(())
    }

    fn ping(&mut self) -> bool {
        match self.connection.as_mut() {
            Some(conn) if !conn.is_closed() => {
                conn.simple_query("").map(|_| ()).is_ok()
            }
            _ => false,
        }
    }

    fn execute(&mut self, statement: &str) -> Result<(), Self::Error> {
        let conn =
            self.connection.as_mut().ok_or(PostgresError::NotConnected)?;
        conn.batch_execute(statement)?;
        Ok(())
    }
}

/// Connection parameters read from `<key>.host`, `<key>.port`,
/// `<key>.user`, `<key>.password`, `<key>.db` and
/// `<key>.application_name`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostgresConnectionConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub application_name: Option<String>,
}

impl PostgresConnectionConfig {
    pub fn from_store(
        store: &dyn ConfigStore,
        config_key: &str,
    ) -> Result<Self, PostgresError> {
        let get =
            |name: &str| store.get_string(&[config_key, ".", name].concat());

        let port = match get("port") {
            Some(port) => Some(port.parse::<u16>().map_err(|_| {
                PostgresError::InvalidConfig(format!(
                    "{}.port is not a port number: {:?}",
                    config_key, port
                ))
            })?),
            None => None,
        };

        Ok(PostgresConnectionConfig {
            user: get("user"),
            password: get("password"),
            host: get("host"),
            port,
            database: get("db").filter(|db| !db.is_empty()),
            application_name: get("application_name"),
        })
    }
}

impl From<PostgresConnectionConfig> for Config {
    fn from(config: PostgresConnectionConfig) -> Self {
        let mut pg_config = Config::new();
        pg_config.host(config.host.as_deref().unwrap_or("localhost"));
        if let Some(port) = config.port {
            pg_config.port(port);
        }
        if let Some(user) = &config.user {
            pg_config.user(user);
        }
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        if let Some(database) = &config.database {
            pg_config.dbname(database);
        }
        if let Some(application_name) = &config.application_name {
            pg_config.application_name(application_name);
        }
        pg_config
    }
}
