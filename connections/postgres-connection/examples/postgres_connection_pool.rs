// Copyright 2020 Joyent, Inc.

//! A basic example that builds a pool of PostgreSQL sessions from a JSON
//! configuration document and runs a query on each of a few worker threads.

use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::json;
use slog::{info, o, Drain, Logger};

use dbpool::connection::Connection;
use dbpool::connection_pool::types::PoolOptions;
use dbpool::connection_pool::Pool;
use dbpool_postgres_connection::PostgresConnection;

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    let config = Arc::new(json!({
        "postgres": {
            "host": "127.0.0.1",
            "port": 5432,
            "user": "postgres",
            "db": "test"
        }
    }));

    let connection_creator = PostgresConnection::connection_creator(
        config.clone(),
        Some(String::from("postgres-connection-pool")),
    );
    let pool_opts = PoolOptions {
        max_connections: Some(5),
        init_statement: Some(String::from("SET TIME ZONE 'UTC'")),
        log: Some(log.clone()),
        ..Default::default()
    };

    let pool = Pool::new("postgres", config, connection_creator, pool_opts);

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            let log = log.clone();
            thread::spawn(move || match pool.acquire() {
                Ok(handle) => match handle.get() {
                    Ok(mut session) => {
                        let result = session.execute("SELECT 1");
                        info!(log, "worker {} query result: {:?}", i, result);
                    }
                    Err(e) => info!(log, "worker {} lost its session: {}", i, e),
                },
                Err(e) => info!(log, "worker {} got no connection: {}", i, e),
            })
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }

    info!(log, "pool stats: {:?}", pool.stats());
}
