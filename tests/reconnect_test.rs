// Copyright 2020 Joyent, Inc.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dbpool::connection::Connection;
use dbpool::connection_pool::types::PoolOptions;
use dbpool::connection_pool::Pool;
use dbpool::error::Error;

use common::{FakeBackend, FakeConnection};

const INIT_STATEMENT: &str = "SET NAMES utf8";

fn new_pool(
    backend: &Arc<FakeBackend>,
    init_statement: Option<&str>,
) -> Pool<FakeConnection> {
    let opts = PoolOptions {
        initial_connections: Some(1),
        max_connections: Some(2),
        init_statement: init_statement.map(String::from),
        acquire_retry_interval: Some(100),
        reconnect_interval: Some(50),
        log: Some(common::test_log()),
        ..Default::default()
    };
    Pool::new("mysql", common::config("mysql"), backend.creator(), opts)
}

#[test]
fn reconnect_after_restart() {
    let backend = FakeBackend::new();
    let pool = new_pool(&backend, None);

    let handle = pool.acquire().expect("acquire");
    let session_id = handle.get().expect("get").id;
    handle.get().expect("get").execute("SELECT 1").unwrap();

    backend.restart();
    assert!(!handle.try_liveness());

    let mut session = handle.get().expect("get");
    assert_eq!(session.id, session_id);
    session.execute("SELECT 1").expect("execute after reconnect");
    drop(session);

    assert_eq!(backend.connect_count(), 2);
    assert_eq!(backend.executed(), vec!["SELECT 1", "SELECT 1"]);
}

#[test]
fn reconnect_retries_until_ping() {
    let backend = FakeBackend::new();
    let pool = new_pool(&backend, None);

    let handle = pool.acquire().expect("acquire");
    backend.restart();
    // The ping after the first reconnect fails too.
    backend.fail_pings(1);

    let start = Instant::now();
    let mut session = handle.get().expect("get");
    assert!(start.elapsed() >= Duration::from_millis(50));
    session.execute("SELECT 1").expect("execute");

    assert_eq!(backend.connect_count(), 3);
}

#[test]
fn reconnect_failure_propagates() {
    let backend = FakeBackend::new();
    let pool = new_pool(&backend, None);

    let handle = pool.acquire().expect("acquire");
    backend.set_down(true);

    match handle.get() {
        Err(Error::Reconnect { errno, description, .. }) => {
            assert_eq!(errno, common::CANT_CONNECT);
            assert_eq!(description, "metrika@127.0.0.1:3306 as user web");
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("dead backend yielded a session"),
    }

    backend.set_down(false);
    handle.get().expect("get").execute("SELECT 1").unwrap();
}

#[test]
fn init_statement_after_every_connect() {
    let backend = FakeBackend::new();
    let pool = new_pool(&backend, Some(INIT_STATEMENT));

    let first = pool.acquire().expect("acquire");
    let second = pool.acquire().expect("acquire");
    assert!(!first.same_session(&second));
    assert_eq!(backend.executed(), vec![INIT_STATEMENT, INIT_STATEMENT]);

    // A live session is not reinitialized.
    first.get().expect("get").execute("SELECT 1").unwrap();
    assert_eq!(
        backend.executed(),
        vec![INIT_STATEMENT, INIT_STATEMENT, "SELECT 1"]
    );

    backend.restart();
    second.get().expect("get").execute("SELECT 2").unwrap();
    assert_eq!(
        backend.executed(),
        vec![
            INIT_STATEMENT,
            INIT_STATEMENT,
            "SELECT 1",
            INIT_STATEMENT,
            "SELECT 2"
        ]
    );
}

#[test]
fn init_statement_failure() {
    let backend = FakeBackend::new();
    backend.fail_statement(INIT_STATEMENT);
    let pool = new_pool(&backend, Some(INIT_STATEMENT));

    let err = pool.acquire().expect_err("init statement must fail");
    assert_eq!(err.errno(), Some(1064));
    match err {
        Error::InitStatement { statement, .. } => {
            assert_eq!(statement, INIT_STATEMENT)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(pool.stats().total_connections, 0.into());
}
