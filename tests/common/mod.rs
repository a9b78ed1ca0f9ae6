// Copyright 2020 Joyent, Inc.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use slog::{o, Drain, Logger};
use thiserror::Error;

use dbpool::config::ConfigStore;
use dbpool::connection::{Connection, DriverError};

// Client error codes the fake server reports for an outage.
pub const CANT_CONNECT: u32 = 2003;
pub const SERVER_GONE: u32 = 2006;

#[derive(Debug, Error)]
#[error("{message} (errno {errno})")]
pub struct FakeError {
    pub errno: u32,
    pub message: String,
}

impl DriverError for FakeError {
    fn errno(&self) -> u32 {
        self.errno
    }
}

/// A scriptable database server shared by every session of a test.
#[derive(Debug, Default)]
pub struct FakeBackend {
    down: AtomicBool,
    // Every restart bumps the generation and kills existing sessions.
    generation: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_pings: AtomicUsize,
    fatal_errno: AtomicU32,
    failing_statement: Mutex<Option<String>>,
    next_session_id: AtomicUsize,
    pub connects: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeBackend::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn restart(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail with a transient error.
    pub fn fail_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` pings of connected sessions fail.
    pub fn fail_pings(&self, n: usize) {
        self.failing_pings.store(n, Ordering::SeqCst);
    }

    /// Make every connect attempt fail with `errno`; zero clears it.
    pub fn reject_with(&self, errno: u32) {
        self.fatal_errno.store(errno, Ordering::SeqCst);
    }

    pub fn fail_statement(&self, statement: &str) {
        *self.failing_statement.lock().unwrap() = Some(statement.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn creator(self: &Arc<Self>) -> impl Fn() -> FakeConnection {
        let backend = Arc::clone(self);
        move || FakeConnection {
            id: backend.next_session_id.fetch_add(1, Ordering::SeqCst),
            backend: Arc::clone(&backend),
            generation: None,
        }
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    pub id: usize,
    backend: Arc<FakeBackend>,
    generation: Option<usize>,
}

impl FakeConnection {
    fn alive(&self) -> bool {
        !self.backend.down.load(Ordering::SeqCst)
            && self.generation
                == Some(self.backend.generation.load(Ordering::SeqCst))
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Connection for FakeConnection {
    type Error = FakeError;

    fn connect(&mut self, config_key: &str) -> Result<(), FakeError> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        self.generation = None;

        let errno = self.backend.fatal_errno.load(Ordering::SeqCst);
        if errno != 0 {
            return Err(FakeError {
                errno,
                message: format!("access denied for {}", config_key),
            });
        }

        if take_one(&self.backend.failing_connects)
            || self.backend.down.load(Ordering::SeqCst)
        {
            return Err(FakeError {
                errno: CANT_CONNECT,
                message: String::from("can't connect to server"),
            });
        }

        self.generation = Some(self.backend.generation.load(Ordering::SeqCst));
        Ok(())
    }

    fn ping(&mut self) -> bool {
        self.alive() && !take_one(&self.backend.failing_pings)
    }

    fn execute(&mut self, statement: &str) -> Result<(), FakeError> {
        if !self.alive() {
            return Err(FakeError {
                errno: SERVER_GONE,
                message: String::from("server has gone away"),
            });
        }

        let failing = self.backend.failing_statement.lock().unwrap();
        if failing.as_deref() == Some(statement) {
            return Err(FakeError {
                errno: 1064,
                message: format!("syntax error in {}", statement),
            });
        }
        drop(failing);

        self.backend
            .executed
            .lock()
            .unwrap()
            .push(statement.to_string());
        Ok(())
    }
}

pub fn config(key: &str) -> Arc<dyn ConfigStore> {
    let mut values = HashMap::new();
    values.insert(format!("{}.db", key), String::from("metrika"));
    values.insert(format!("{}.host", key), String::from("127.0.0.1"));
    values.insert(format!("{}.port", key), String::from("3306"));
    values.insert(format!("{}.user", key), String::from("web"));
    Arc::new(values)
}

pub fn test_log() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    )
}
