use std::io;

use thiserror::Error;

/// Invalid run or pool parameters. Returned before any call is attempted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency budget must allow at least one outstanding call")]
    ZeroBudget,
    #[error("connection pool must hold at least one connection")]
    EmptyPool,
}

/// A connection in the pool could not be established.
///
/// Pool construction is all-or-nothing, so this aborts the whole pool.
#[derive(Debug, Error)]
#[error("connection {index} to {addr} could not be established")]
pub struct ConnectionError {
    pub index: usize,
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// A single remote call failed.
///
/// Call errors never stop a run: the dispatcher tallies them and releases the
/// budget unit like any other completion.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport error")]
    Transport(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("remote error: {0}")]
    Remote(String),
    #[error("echo mismatch: sent {expected:?}, received {actual:?}")]
    Mismatch { expected: String, actual: String },
}

/// Errors that prevent a pool from being built or a run from starting.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
