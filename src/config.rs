// Copyright 2020 Joyent, Inc.

//! Access to connection parameters.
//!
//! The pool never sees connection parameters directly. It is handed a
//! symbolic *config key* and looks up `<config_key>.db`, `<config_key>.host`,
//! `<config_key>.port` and `<config_key>.user` in a [`ConfigStore`] to build
//! the human readable description it uses in log messages. Drivers are
//! expected to read the same store when `connect` is called with that key.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Error;

/// A keyed string lookup.
pub trait ConfigStore: Send + Sync {
    /// Return the value stored under the dotted `key`, if any.
    fn get_string(&self, key: &str) -> Option<String>;
}

impl ConfigStore for HashMap<String, String> {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// A JSON document is a config store: `mysql.host` resolves to
/// `{"mysql": {"host": ...}}`. Strings are returned as is, numbers and
/// booleans in their JSON text form. Objects, arrays and null are not values.
impl ConfigStore for Value {
    fn get_string(&self, key: &str) -> Option<String> {
        let node = key
            .split('.')
            .try_fold(self, |node, part| node.get(part))?;

        match node {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn required(
    store: &dyn ConfigStore,
    config_key: &str,
    name: &str,
) -> Result<String, Error> {
    let key = [config_key, ".", name].concat();
    store.get_string(&key).ok_or(Error::MissingConfig(key))
}

/// Compose `"<db>@<host>:<port> as user <user>"` for `config_key`. The
/// database name defaults to empty; host, port and user are required.
pub fn describe(
    store: &dyn ConfigStore,
    config_key: &str,
) -> Result<String, Error> {
    let db = store
        .get_string(&[config_key, ".db"].concat())
        .unwrap_or_default();
    let host = required(store, config_key, "host")?;
    let port = required(store, config_key, "port")?;
    let user = required(store, config_key, "user")?;

    Ok(format!("{}@{}:{} as user {}", db, host, port, user))
}
