//! Saturate — measure the maximum sustained request rate of a remote endpoint
//! under a cap on requests in flight.
//!
//! The crate is built around one component, the bounded dispatcher: it issues
//! calls as fast as a fixed concurrency budget allows, spreads them round-robin
//! over a pool of independent connections, stops admitting at a deadline and then
//! drains, so every issued call is accounted for before throughput is reported.
//!
//! # Architecture
//!
//! - [`Connection`]: anything that can perform one call at a time and report
//!   success or failure. The dispatcher never looks at payloads.
//! - [`ConnectionPool`]: a fixed set of connections established up front. Building
//!   it is all-or-nothing.
//! - [`BoundedDispatcher`]: admission, dispatch and drain. This is where
//!   performance matters.
//! - [`RunResult`]: the raw outcome of one run (admitted calls, failures, elapsed).
//! - [`Report`]: transforms a `RunResult` into presentable figures.
//! - [`Reporter`]: sends a `Report` somewhere (stdout, JSON).
//!
#![cfg_attr(
    feature = "builtins",
    doc = r#"
# Example

```rust,no_run
use std::time::Duration;

use saturate::{
    BoundedDispatcher, ConnectionPool, Reporter,
    connection::line::{LineConnector, Procedure},
    dispatcher::Budget,
    report::{StdoutReporter, ThroughputReport},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pool = ConnectionPool::connect(&LineConnector, "localhost:8000", 10).await?;
    let result = BoundedDispatcher::builder()
        .budget(Budget::Bounded(5000))
        .duration(Duration::from_secs(2))
        .build()
        .run(&pool, Procedure::Nothing)
        .await?;

    StdoutReporter.report(&ThroughputReport::from(result)).await
}
```
"#
)]
//!
//! # Feature flags
//!
//! - `builtins`: a newline-delimited TCP [`connection::line`] client and the
//!   matching no-op/echo [`service`] to calibrate against. (Enabled by default)

/// Connections and the connection pool
pub mod connection;
/// Admission, dispatch and drain
pub mod dispatcher;
/// Error types
pub mod error;
/// Reports and Reporters
pub mod report;
/// The calibration target service
#[cfg(feature = "builtins")]
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionPool, Connector};
pub use dispatcher::{BoundedDispatcher, RunResult};
pub use error::{CallError, ConfigError, ConnectionError, Error};
pub use report::{Report, Reporter};
