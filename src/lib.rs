// Copyright 2020 Joyent, Inc.

//! A bounded pool of relational database sessions
//!
//! `dbpool` manages a fixed-capacity set of long-lived database sessions for
//! threaded programs. Callers get reference-counted
//! [`Handle`](connection_pool/struct.Handle.html)s to a pooled session; a session whose
//! backend went away is transparently re-established the next time a handle
//! accesses it.
//!
//! The pool relies on two traits supplied by the application:
//!
//! ## Connections
//!
//! The [`Connection`](connection/trait.Connection.html) trait is the pool's
//! view of a database driver session: `connect`, `ping` and `execute`.
//! Driver errors implement
//! [`DriverError`](connection/trait.DriverError.html) and carry a numeric
//! error code. Codes for rejected credentials or an unknown database are
//! *fatal*: retrying will not fix them, so the pool always reports them.
//!
//! ## Configuration
//!
//! The pool is given a *config key* and a
//! [`ConfigStore`](config/trait.ConfigStore.html). It reads
//! `<key>.db`, `<key>.host`, `<key>.port` and `<key>.user` to describe the
//! database in its log messages; the driver reads whatever it needs from the
//! same store when `connect` is called with the key. A `serde_json::Value`
//! document or a `HashMap<String, String>` can be used as a store directly.
//!
//! ## Acquiring connections
//!
//! There are two ways to get a connection:
//!
//! * [`Pool::acquire`](connection_pool/struct.Pool.html#method.acquire)
//!   blocks until a session is available. Once the pool has connected at
//!   least once, an unreachable backend makes it wait and retry instead of
//!   failing.
//! * [`Pool::try_acquire`](connection_pool/struct.Pool.html#method.try_acquire)
//!   never waits. It returns an empty handle when the backend cannot be
//!   reached and `Error::PoolFull` when every session is in use, so a caller
//!   can tell a saturated pool from a degraded backend.
//!
//! Either way, the first acquisition opens the configured number of initial
//! connections. A connect failure before any connect has ever succeeded is
//! returned to the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::thread;
//!
//! use serde_json::json;
//!
//! use dbpool::connection_pool::types::PoolOptions;
//! use dbpool::connection_pool::Pool;
//!
//! let config = json!({
//!     "mysql": {
//!         "db": "metrika",
//!         "host": "127.0.0.1",
//!         "port": 3306,
//!         "user": "web"
//!     }
//! });
//!
//! let pool_opts = PoolOptions {
//!     max_connections: Some(4),
//!     init_statement: Some(String::from("SET NAMES utf8")),
//!     ..Default::default()
//! };
//!
//! let pool = Pool::new("mysql", Arc::new(config), MySession::new, pool_opts);
//!
//! for _ in 0..10 {
//!     let pool = pool.clone();
//!     thread::spawn(move || {
//!         let handle = pool.acquire()?;
//!         handle.get()?.execute("SELECT 1")?;
//!         // The session is returned to the pool when the handle is dropped.
//!     });
//! }
//! ```
//!
//! See the `dbpool-postgres-connection` crate for a `Connection`
//! implementation over the `postgres` client.

#![allow(missing_docs)]

pub mod config;
pub mod connection;
pub mod connection_pool;
pub mod error;
