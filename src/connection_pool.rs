// Copyright 2020 Joyent, Inc.

pub mod types;

use std::fmt::Result as FmtResult;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::{Arc, MutexGuard};
use std::thread;
use std::time::Duration;

use slog::{debug, error, info, o, trace, warn, Drain, Logger};

use crate::config::{self, ConfigStore};
use crate::connection::{is_fatal_errno, Connection, DriverError};
use crate::connection_pool::types::{
    PoolData, PoolOptions, PoolStats, ProtectedData, Slot,
};
use crate::error::Error;

// Number of connections opened on first use
const DEFAULT_INITIAL_CONNECTIONS: u32 = 1;
// Default number of maximum pool connections
const DEFAULT_MAX_CONNECTIONS: u32 = 16;
// Wait before a blocked acquire retries, in milliseconds
const DEFAULT_ACQUIRE_RETRY_INTERVAL: u64 = 10_000;
// Delay between reconnect attempts of a dead session, in milliseconds
const DEFAULT_RECONNECT_INTERVAL: u64 = 5_000;

/// What the pool does with a failed connect attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectFailure {
    /// The error code says retrying cannot help.
    Fatal,
    /// Nothing has ever connected and the caller wants to know.
    ColdStart,
    /// The process is shutting down.
    Shutdown,
    /// Log it and report that no connection is available.
    Transient,
}

/// Decide how a failed connect attempt is reported. Fatal codes win over
/// everything, then a cold start that the caller did not ask to suppress,
/// then shutdown.
pub fn classify_connect_failure(
    errno: u32,
    ever_succeeded: bool,
    suppress_first_failure: bool,
    shutting_down: bool,
) -> ConnectFailure {
    if is_fatal_errno(errno) {
        ConnectFailure::Fatal
    } else if !ever_succeeded && !suppress_first_failure {
        ConnectFailure::ColdStart
    } else if shutting_down {
        ConnectFailure::Shutdown
    } else {
        ConnectFailure::Transient
    }
}

// Immutable pool policy shared by all clones of a pool and by its handles.
struct PoolSettings<C> {
    config_key: String,
    config: Arc<dyn ConfigStore>,
    create_connection: Box<dyn Fn() -> C + Send + Sync>,
    initial_connections: u32,
    max_connections: u32,
    init_statement: String,
    acquire_retry_interval: Duration,
    reconnect_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

/// A bounded pool of database sessions
///
/// Cloning a pool is cheap; all clones share the same sessions. The pool
/// state lives as long as any clone or any outstanding [`Handle`] does.
pub struct Pool<C>
where
    C: Connection,
{
    protected_data: ProtectedData<C>,
    settings: Arc<PoolSettings<C>>,
    log: Logger,
}

impl<C> Debug for Pool<C>
where
    C: Connection,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("Pool")
            .field("config_key", &self.settings.config_key)
            .field("initial_connections", &self.settings.initial_connections)
            .field("max_connections", &self.settings.max_connections)
            .field("init_statement", &self.settings.init_statement)
            .field("log", &self.log)
            .finish()
    }
}

impl<C> Clone for Pool<C>
where
    C: Connection,
{
    fn clone(&self) -> Pool<C> {
        Pool {
            protected_data: self.protected_data.clone(),
            settings: Arc::clone(&self.settings),
            log: self.log.clone(),
        }
    }
}

impl<C> Pool<C>
where
    C: Connection,
{
    /// Create a pool for the connection parameters stored under `config_key`.
    ///
    /// `create_connection` builds a fresh, unconnected session; the pool
    /// connects it. No I/O happens here: the first `acquire` or
    /// `try_acquire` reads the configuration and opens the initial
    /// connections.
    pub fn new<F>(
        config_key: &str,
        config: Arc<dyn ConfigStore>,
        create_connection: F,
        po: PoolOptions,
    ) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        let max_connections =
            po.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let logger = po
            .log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()))
            .new(o!("config_key" => config_key.to_string()));

        let settings = PoolSettings {
            config_key: config_key.to_string(),
            config,
            create_connection: Box::new(create_connection),
            initial_connections: po
                .initial_connections
                .unwrap_or(DEFAULT_INITIAL_CONNECTIONS),
            max_connections,
            init_statement: po.init_statement.unwrap_or_default(),
            acquire_retry_interval: Duration::from_millis(
                po.acquire_retry_interval
                    .unwrap_or(DEFAULT_ACQUIRE_RETRY_INTERVAL),
            ),
            reconnect_interval: Duration::from_millis(
                po.reconnect_interval.unwrap_or(DEFAULT_RECONNECT_INTERVAL),
            ),
            shutdown: po
                .shutdown
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        };

        Pool {
            protected_data: ProtectedData::new(PoolData::new(
                max_connections as usize,
            )),
            settings: Arc::new(settings),
            log: logger,
        }
    }

    /// Get a connection, blocking until one is available.
    ///
    /// Returns an idle connection if there is one, otherwise opens a new one
    /// while the pool is below its maximum. When neither works the caller
    /// waits for a handle to be released or for the retry interval to pass
    /// and tries again. Once the pool has connected at least once, an
    /// unreachable backend only makes this wait longer; it never fails for
    /// that reason.
    pub fn acquire(&self) -> Result<Handle<C>, Error> {
        let mut pool_data = self.protected_data.pool_data_lock();

        self.initialize(&mut pool_data)?;

        loop {
            let idle = pool_data.idle_slot().cloned();
            if let Some(slot) = idle {
                trace!(self.log, "Found idle connection");
                return Ok(Handle::new(&slot, self));
            }

            if pool_data.slots.len() < self.settings.max_connections as usize
            {
                if let Some(slot) =
                    self.alloc_connection(&mut pool_data, false)?
                {
                    return Ok(Handle::new(&slot, self));
                }
            }

            debug!(
                self.log,
                "No connection available, waiting up to {:?}",
                self.settings.acquire_retry_interval
            );
            let wait_result = self
                .protected_data
                .condvar_wait(pool_data, self.settings.acquire_retry_interval);
            pool_data = wait_result.0;
        }
    }

    /// Get a connection without waiting.
    ///
    /// Returns an empty handle if the backend cannot be reached: either the
    /// idle connection failed its ping or a new connection could not be
    /// opened. Returns `Error::PoolFull` if every connection is in use and
    /// the pool is at its maximum.
    pub fn try_acquire(&self) -> Result<Handle<C>, Error> {
        let mut pool_data = self.protected_data.pool_data_lock();

        self.initialize(&mut pool_data)?;

        let idle = pool_data.idle_slot().cloned();
        if let Some(slot) = idle {
            let handle = Handle::new(&slot, self);
            // The handle holds the slot now, so the ping can run unlocked.
            drop(pool_data);
            if handle.try_liveness() {
                return Ok(handle);
            }
            warn!(self.log, "Idle connection failed ping");
            return Ok(Handle::default());
        }

        if pool_data.slots.len() >= self.settings.max_connections as usize {
            debug!(self.log, "Pool is full");
            return Err(Error::PoolFull);
        }

        match self.alloc_connection(&mut pool_data, true)? {
            Some(slot) => Ok(Handle::new(&slot, self)),
            None => Ok(Handle::default()),
        }
    }

    /// The description of the database this pool connects to, in the form
    /// `<db>@<host>:<port> as user <user>`. Empty until the first
    /// acquisition.
    pub fn describe(&self) -> String {
        self.protected_data.pool_data_lock().description.clone()
    }

    pub fn stats(&self) -> PoolStats {
        self.protected_data.pool_data_lock().stats()
    }

    pub fn config_key(&self) -> &str {
        &self.settings.config_key
    }

    pub fn max_connections(&self) -> u32 {
        self.settings.max_connections
    }

    // Runs once, with the pool lock held, on the first acquisition.
    fn initialize(&self, pool_data: &mut PoolData<C>) -> Result<(), Error> {
        if pool_data.initialized {
            return Ok(());
        }

        pool_data.description = config::describe(
            self.settings.config.as_ref(),
            &self.settings.config_key,
        )?;

        debug!(
            self.log,
            "Opening {} initial connections to {}",
            self.settings.initial_connections,
            pool_data.description
        );

        for _ in 0..self.settings.initial_connections {
            if pool_data.slots.len() >= self.settings.max_connections as usize
            {
                break;
            }
            self.alloc_connection(pool_data, false)?;
        }

        pool_data.initialized = true;
        Ok(())
    }

    // Open a new connection and add it to the pool. `Ok(None)` means the
    // attempt failed in a way the caller is expected to absorb.
    fn alloc_connection(
        &self,
        pool_data: &mut PoolData<C>,
        suppress_first_failure: bool,
    ) -> Result<Option<Arc<Slot<C>>>, Error> {
        info!(self.log, "Connecting to {}", pool_data.description);

        let mut conn = (self.settings.create_connection)();
        match conn.connect(&self.settings.config_key) {
            Ok(()) => {
                pool_data.ever_succeeded = true;
                self.after_connect(&mut conn)?;

                let slot = Arc::new(Slot::new(conn));
                pool_data.slots.push(Arc::clone(&slot));
                debug!(
                    self.log,
                    "Added connection, total connections: {}",
                    pool_data.slots.len()
                );
                Ok(Some(slot))
            }
            Err(err) => {
                let errno = err.errno();
                error!(
                    self.log,
                    "Connect to {} failed: {}", pool_data.description, err;
                    "errno" => errno
                );

                let shutting_down =
                    self.settings.shutdown.load(AtomicOrdering::Relaxed);
                let description = pool_data.description.clone();
                match classify_connect_failure(
                    errno,
                    pool_data.ever_succeeded,
                    suppress_first_failure,
                    shutting_down,
                ) {
                    ConnectFailure::Fatal => Err(Error::FatalAuth {
                        description,
                        errno,
                        source: Box::new(err),
                    }),
                    ConnectFailure::ColdStart => Err(Error::ColdStartFailed {
                        description,
                        errno,
                        source: Box::new(err),
                    }),
                    ConnectFailure::Shutdown => {
                        Err(Error::ShutdownDuringConnect { description })
                    }
                    ConnectFailure::Transient => Ok(None),
                }
            }
        }
    }

    fn after_connect(&self, conn: &mut C) -> Result<(), Error> {
        let statement = &self.settings.init_statement;
        if statement.is_empty() {
            return Ok(());
        }

        trace!(self.log, "{}", statement);
        conn.execute(statement)
            .map_err(|err| Error::InitStatement {
                statement: statement.clone(),
                errno: err.errno(),
                source: Box::new(err),
            })
    }

    // Make sure the session answers a ping, reconnecting in place until it
    // does. Runs without the pool lock; the caller holds the session lock.
    fn force_connected(&self, conn: &mut C) -> Result<(), Error> {
        if conn.ping() {
            return Ok(());
        }

        let description = self.describe();
        let mut first = true;
        loop {
            if first {
                first = false;
            } else {
                thread::sleep(self.settings.reconnect_interval);
            }

            info!(self.log, "Reconnecting to {}", description);
            conn.connect(&self.settings.config_key).map_err(|err| {
                Error::Reconnect {
                    description: description.clone(),
                    errno: err.errno(),
                    source: Box::new(err),
                }
            })?;

            if conn.ping() {
                break;
            }
        }

        self.after_connect(conn)
    }

    // A slot lost its last handle. Taking the lock orders this notification
    // after any waiter that already found the pool busy has started waiting.
    fn release(&self) {
        let _pool_data = self.protected_data.pool_data_lock();
        self.protected_data.condvar_notify();
    }
}

/// A handle on one pooled session.
///
/// A handle is either empty or refers to one session of the pool. While any
/// handle (including clones) refers to a session, the pool will not give that
/// session to anyone else. The session returns to the pool when the last
/// handle referring to it is dropped.
pub struct Handle<C>
where
    C: Connection,
{
    slot: Option<Arc<Slot<C>>>,
    connection_pool: Option<Pool<C>>,
}

impl<C> Handle<C>
where
    C: Connection,
{
    fn new(slot: &Arc<Slot<C>>, pool: &Pool<C>) -> Self {
        slot.add_ref();
        Handle {
            slot: Some(Arc::clone(slot)),
            connection_pool: Some(pool.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.slot.is_none()
    }

    /// Access the session, reconnecting first if it no longer answers a
    /// ping. Reconnecting is retried until it succeeds, so this can block for
    /// as long as the backend is down. Errors with `Error::NullHandleAccess`
    /// on an empty handle.
    pub fn get(&self) -> Result<SessionGuard<'_, C>, Error> {
        let (slot, pool) = match (&self.slot, &self.connection_pool) {
            (Some(slot), Some(pool)) => (slot, pool),
            _ => return Err(Error::NullHandleAccess),
        };

        let mut guard = slot.session_lock();
        pool.force_connected(&mut guard)?;
        Ok(SessionGuard { guard })
    }

    /// Ping the session once without reconnecting.
    pub fn try_liveness(&self) -> bool {
        match &self.slot {
            Some(slot) => slot.session_lock().ping(),
            None => false,
        }
    }

    /// Number of handles currently referring to this handle's session.
    pub fn ref_count(&self) -> usize {
        self.slot.as_ref().map_or(0, |slot| slot.ref_count())
    }

    /// True if both handles refer to the same pooled session.
    pub fn same_session(&self, other: &Handle<C>) -> bool {
        match (&self.slot, &other.slot) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<C> Default for Handle<C>
where
    C: Connection,
{
    fn default() -> Self {
        Handle {
            slot: None,
            connection_pool: None,
        }
    }
}

impl<C> Clone for Handle<C>
where
    C: Connection,
{
    fn clone(&self) -> Self {
        if let Some(slot) = &self.slot {
            slot.add_ref();
        }
        Handle {
            slot: self.slot.clone(),
            connection_pool: self.connection_pool.clone(),
        }
    }
}

impl<C> Debug for Handle<C>
where
    C: Connection,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("Handle")
            .field("null", &self.is_null())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

impl<C> Drop for Handle<C>
where
    C: Connection,
{
    fn drop(&mut self) {
        if let (Some(slot), Some(pool)) =
            (self.slot.take(), &self.connection_pool)
        {
            if slot.release() {
                pool.release();
            }
        }
    }
}

/// Exclusive access to a pooled session, returned by [`Handle::get`].
pub struct SessionGuard<'a, C> {
    guard: MutexGuard<'a, C>,
}

impl<'a, C> Deref for SessionGuard<'a, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<'a, C> DerefMut for SessionGuard<'a, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}
