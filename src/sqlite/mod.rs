// SQLite backend over rusqlite:
// - config: driver and per-file options (WAL, busy timeout, statement cache)
// - connection: the shared connection handle and direct query/exec
// - statement: prepared statements backed by rusqlite's statement cache
// - params: conversion between row values and SQLite values
// - query: row extraction and buffering
// - transaction: BEGIN/COMMIT/ROLLBACK

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod statement;
pub mod transaction;

pub use config::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use params::Params as SqliteParams;
pub use statement::SqliteStatement;
pub use transaction::SqliteTx;
