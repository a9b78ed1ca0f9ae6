// Copyright 2020 Joyent, Inc.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};
use slog::Logger;

/// The connection counts for the connection pool
#[derive(Copy, Clone, Debug)]
pub struct PoolStats {
    /// The total number of established connections
    pub total_connections: ConnectionCount,
    /// The count of connections not referenced by any handle
    pub idle_connections: ConnectionCount,
}

/// The configuration options for a connection pool. Every field is optional;
/// `PoolOptions::default()` gives a pool that opens one connection up front
/// and grows to at most 16.
#[derive(Debug, Default)]
pub struct PoolOptions {
    /// Number of connections opened on the first acquisition. If not
    /// specified the default is 1.
    pub initial_connections: Option<u32>,
    /// Maximum number of connections the pool will hold. If not specified
    /// the default is 16.
    pub max_connections: Option<u32>,
    /// Statement run after every successful connect, e.g. `SET NAMES utf8`.
    pub init_statement: Option<String>,
    /// How long a blocked `acquire` waits before retrying to grow the pool,
    /// in milliseconds. If not specified the default is 10 seconds.
    pub acquire_retry_interval: Option<u64>,
    /// Delay between reconnect attempts on a dead session, in milliseconds.
    /// The first attempt is always immediate. If not specified the default
    /// is 5 seconds.
    pub reconnect_interval: Option<u64>,
    /// Process shutdown flag. Once set, transient connect failures are
    /// reported as `Error::ShutdownDuringConnect` instead of being retried.
    pub shutdown: Option<Arc<AtomicBool>>,
    /// An optional `slog` logger instance. If none is provided then the logging
    /// will fall back to using the [`slog-stdlog`](https://docs.rs/slog-stdlog)
    /// drain which is essentially the same as using the rust standard
    /// [`log`](https://docs.rs/log) crate.
    pub log: Option<Logger>,
}

/// A newtype wrapper around u32 used for counts of connections maintained by
/// the connection pool.
#[derive(
    Add,
    AddAssign,
    Clone,
    Copy,
    Debug,
    Display,
    Eq,
    From,
    Into,
    Ord,
    PartialOrd,
    PartialEq,
    Sub,
    SubAssign,
)]
pub struct ConnectionCount(u32);

// One pooled session and the number of handles referring to it. The count is
// only ever raised with the pool lock held; handles lower it on drop without
// the lock.
#[doc(hidden)]
#[derive(Debug)]
pub struct Slot<C> {
    session: Mutex<C>,
    refs: AtomicUsize,
}

impl<C> Slot<C> {
    pub fn new(session: C) -> Self {
        Slot {
            session: Mutex::new(session),
            refs: AtomicUsize::new(0),
        }
    }

    pub fn session_lock(&self) -> MutexGuard<C> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.ref_count() == 0
    }

    pub fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    // Returns true when this was the last reference.
    pub fn release(&self) -> bool {
        self.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

// The mutable state of the pool, only touched with the pool lock held.
#[doc(hidden)]
#[derive(Debug)]
pub struct PoolData<C> {
    pub slots: Vec<Arc<Slot<C>>>,
    pub initialized: bool,
    pub ever_succeeded: bool,
    pub description: String,
}

impl<C> PoolData<C> {
    #[doc(hidden)]
    pub fn new(max_size: usize) -> Self {
        PoolData {
            slots: Vec::with_capacity(max_size),
            initialized: false,
            ever_succeeded: false,
            description: String::new(),
        }
    }

    pub fn idle_slot(&self) -> Option<&Arc<Slot<C>>> {
        self.slots.iter().find(|slot| slot.is_idle())
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.slots.iter().filter(|slot| slot.is_idle()).count();
        PoolStats {
            total_connections: ConnectionCount::from(self.slots.len() as u32),
            idle_connections: ConnectionCount::from(idle as u32),
        }
    }
}

// Protected access to the pool state. The condvar is signalled whenever a
// slot loses its last handle.
#[doc(hidden)]
#[derive(Debug)]
pub struct ProtectedData<C>(Arc<(Mutex<PoolData<C>>, Condvar)>);

impl<C> ProtectedData<C> {
    pub fn new(pool_data: PoolData<C>) -> Self {
        ProtectedData(Arc::new((Mutex::new(pool_data), Condvar::new())))
    }

    pub fn pool_data_lock(&self) -> MutexGuard<PoolData<C>> {
        (self.0).0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn condvar_wait<'a>(
        &self,
        g: MutexGuard<'a, PoolData<C>>,
        timeout: Duration,
    ) -> (MutexGuard<'a, PoolData<C>>, bool) {
        let (g, wait_result) = (self.0)
            .1
            .wait_timeout(g, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        (g, wait_result.timed_out())
    }

    pub fn condvar_notify(&self) {
        (self.0).1.notify_one()
    }
}

impl<C> Clone for ProtectedData<C> {
    fn clone(&self) -> ProtectedData<C> {
        ProtectedData(Arc::clone(&self.0))
    }
}
