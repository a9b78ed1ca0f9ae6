// Copyright 2020 Joyent, Inc.

use std::error::Error as StdError;

use thiserror::Error;

/// A boxed driver error kept as the source of a pool error.
pub type DriverFailure = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// The driver rejected the connection with a code that retrying cannot
    /// fix, such as bad credentials or an unknown database.
    #[error("cannot connect to {description} (errno {errno}): {source}")]
    FatalAuth {
        description: String,
        errno: u32,
        source: DriverFailure,
    },
    /// No connection attempt has ever succeeded for this pool and the failed
    /// attempt was not allowed to be absorbed.
    #[error("cannot connect to {description} (errno {errno}): {source}")]
    ColdStartFailed {
        description: String,
        errno: u32,
        source: DriverFailure,
    },
    #[error("shutdown requested while connecting to {description}")]
    ShutdownDuringConnect { description: String },
    #[error("connection pool is full")]
    PoolFull,
    #[error("tried to access a null database connection")]
    NullHandleAccess,
    /// The driver failed while a handle was re-establishing its session.
    #[error("reconnect to {description} failed (errno {errno}): {source}")]
    Reconnect {
        description: String,
        errno: u32,
        source: DriverFailure,
    },
    #[error("init statement {statement:?} failed (errno {errno}): {source}")]
    InitStatement {
        statement: String,
        errno: u32,
        source: DriverFailure,
    },
    #[error("missing configuration value {0}")]
    MissingConfig(String),
}

impl Error {
    /// The driver error code behind this error, if there is one.
    pub fn errno(&self) -> Option<u32> {
        match self {
            Error::FatalAuth { errno, .. }
            | Error::ColdStartFailed { errno, .. }
            | Error::Reconnect { errno, .. }
            | Error::InitStatement { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
