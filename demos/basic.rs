// Copyright 2020 Joyent, Inc.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use slog::{info, o, Drain, Logger};

use dbpool::config::ConfigStore;
use dbpool::connection::{Connection, DriverError};
use dbpool::connection_pool::types::PoolOptions;
use dbpool::connection_pool::Pool;
use dbpool::error::Error;

#[derive(Debug)]
pub struct DummyError;

impl fmt::Display for DummyError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "dummy connection is closed")
    }
}

impl std::error::Error for DummyError {}

impl DriverError for DummyError {
    fn errno(&self) -> u32 {
        2006
    }
}

#[derive(Debug)]
pub struct DummyConnection {
    connected: bool,
}

impl DummyConnection {
    fn new() -> Self {
        DummyConnection { connected: false }
    }
}

impl Connection for DummyConnection {
    type Error = DummyError;

    fn connect(&mut self, _config_key: &str) -> Result<(), DummyError> {
        self.connected = true;
        Ok(())
    }

    fn ping(&mut self) -> bool {
        self.connected
    }

    fn execute(&mut self, _statement: &str) -> Result<(), DummyError> {
        if self.connected {
            Ok(())
        } else {
            Err(DummyError)
        }
    }
}

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    info!(log, "running basic dbpool example");

    let mut values = HashMap::new();
    values.insert(String::from("mysql.db"), String::from("test"));
    values.insert(String::from("mysql.host"), String::from("127.0.0.1"));
    values.insert(String::from("mysql.port"), String::from("3306"));
    values.insert(String::from("mysql.user"), String::from("dummy"));
    let config: Arc<dyn ConfigStore> = Arc::new(values);

    let pool_opts = PoolOptions {
        initial_connections: Some(1),
        max_connections: Some(3),
        init_statement: Some(String::from("SET NAMES utf8")),
        log: Some(log.clone()),
        ..Default::default()
    };

    let pool = Pool::new("mysql", config, DummyConnection::new, pool_opts);

    // Three workers hold every connection the pool may open.
    let barrier1 = Arc::new(Barrier::new(4));
    let barrier2 = Arc::new(Barrier::new(4));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            let barrier1 = barrier1.clone();
            let barrier2 = barrier2.clone();
            thread::spawn(move || {
                let handle = pool.acquire().expect("acquire");
                handle.get().expect("session").execute("SELECT 1").unwrap();
                barrier1.wait();
                barrier2.wait();
            })
        })
        .collect();

    barrier1.wait();

    info!(log, "connected to {}", pool.describe());

    match pool.try_acquire() {
        Err(Error::PoolFull) => info!(log, "pool is full, as expected"),
        other => info!(log, "unexpected try_acquire result: {:?}", other),
    }

    barrier2.wait();

    for worker in workers {
        let _ = worker.join();
    }

    let handle = pool.try_acquire().expect("try_acquire");
    assert!(!handle.is_null());
    info!(log, "pool stats: {:?}", pool.stats());
}
