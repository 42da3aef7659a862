//! Connections to the service under test.
//!
//! The dispatcher is agnostic to the protocol spoken by the target. All it needs
//! is something that can perform one call at a time and report success or
//! failure, which is what [`Connection`] describes. A [`Connector`] knows how to
//! establish such connections, and a [`ConnectionPool`] owns a fixed number of
//! them for the duration of a run.
//!
//! With the `builtins` feature (enabled by default) the [`line`] module provides
//! a newline-delimited TCP connection that talks to [`crate::service`].
pub mod pool;
pub use pool::{ConnectionPool, PooledConnection};

#[cfg(feature = "builtins")]
pub mod line;

use crate::error::CallError;
use std::{future::Future, io};

/// An established connection to the service under test.
///
/// `call` takes `&mut self`: a connection performs exactly one call at a time.
/// The pool serializes concurrent callers that target the same connection.
///
/// # Example
/// ```rust
/// use saturate::{CallError, Connection};
///
/// struct Noop;
///
/// impl Connection for Noop {
///     type Request = ();
///     type Response = ();
///
///     async fn call(&mut self, _: &()) -> Result<(), CallError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Connection
where
    Self: Send + 'static,
{
    type Request: Send + Sync + 'static;
    type Response: Send + 'static;

    /// Perform one remote call.
    fn call(
        &mut self,
        request: &Self::Request,
    ) -> impl Future<Output = Result<Self::Response, CallError>> + Send;
}

/// Establishes [`Connection`]s to a target address.
pub trait Connector
where
    Self: Send + Sync,
{
    type Connection: Connection;

    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<Self::Connection>> + Send;
}
