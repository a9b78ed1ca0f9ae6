// Copyright 2020 Joyent, Inc.

use std::error;

/// The driver reported that the credentials were rejected.
pub const ACCESS_DENIED: u32 = 1045;
/// The driver reported that the user may not access the requested database.
pub const DB_ACCESS_DENIED: u32 = 1044;
/// The driver reported that the requested database does not exist.
pub const BAD_DB: u32 = 1049;

/// Error codes that retrying cannot fix. A connect failure carrying one of
/// these is always returned to the caller, regardless of pool state.
pub const FATAL_ERRNOS: [u32; 3] = [ACCESS_DENIED, DB_ACCESS_DENIED, BAD_DB];

/// Returns true if `errno` signals a misconfiguration rather than an outage.
pub fn is_fatal_errno(errno: u32) -> bool {
    FATAL_ERRNOS.contains(&errno)
}

/// A classified driver error.
///
/// Every error produced by a [`Connection`](trait.Connection.html) carries a
/// numeric error code so the pool can tell a misconfiguration (bad password,
/// unknown database) from a backend that is merely unreachable.
pub trait DriverError: error::Error + Send + Sync + 'static {
    /// The driver specific numeric error code.
    fn errno(&self) -> u32;
}

/// Database session
///
/// The `Connection` trait defines the interface a database driver session must
/// implement in order to be managed by the pool. A session is created
/// disconnected by the factory function given to
/// [`Pool::new`](../connection_pool/struct.Pool.html#method.new) and is
/// connected by the pool. The same session value is reconnected in place when
/// it is found dead, so implementors must support calling `connect` more than
/// once.
pub trait Connection: Send + Sized + 'static {
    /// The error type returned by `connect` and `execute`.
    type Error: DriverError;
    /// Open (or reopen) the session using the parameters stored under
    /// `config_key` in the application configuration.
    fn connect(&mut self, config_key: &str) -> Result<(), Self::Error>;
    /// Cheap liveness probe. Must not panic; a session that was never
    /// connected is simply not alive.
    fn ping(&mut self) -> bool;
    /// Run a textual statement on the session.
    fn execute(&mut self, statement: &str) -> Result<(), Self::Error>;
}
