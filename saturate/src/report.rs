use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt::{self, Debug, Display},
    future::Future,
    time::Duration,
};

use crate::dispatcher::RunResult;

/// A [`Report`] is the processed form of a [`RunResult`].
///
/// Reports are pure data: they derive whatever figures they present from the raw
/// counts and carry no I/O. Writing them somewhere is the job of a [`Reporter`].
///
/// # Example
/// ```rust
/// use saturate::{Report, RunResult};
/// use serde::{Deserialize, Serialize};
/// use std::fmt;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct FailureRatio(f64);
///
/// impl From<RunResult> for FailureRatio {
///     fn from(r: RunResult) -> Self {
///         Self(r.failed as f64 / r.admitted.max(1) as f64)
///     }
/// }
///
/// impl fmt::Display for FailureRatio {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "failure ratio: {:.3}", self.0)
///     }
/// }
///
/// impl Report for FailureRatio {}
/// ```
pub trait Report
where
    Self: Send + Sync + Debug + Display + From<RunResult> + Serialize + DeserializeOwned,
{
}

/// A [`Reporter`] writes a [`Report`] somewhere. One run produces one record.
pub trait Reporter<R: Report> {
    fn report(&self, report: &R) -> impl Future<Output = Result<(), Box<dyn std::error::Error>>>;
}

/// Offered throughput of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    pub admitted: u64,
    pub failed: u64,
    pub elapsed: Duration,
    /// Admitted calls per second of `elapsed`.
    pub rate: f64,
}

impl From<RunResult> for ThroughputReport {
    fn from(value: RunResult) -> Self {
        Self {
            admitted: value.admitted,
            failed: value.failed,
            elapsed: value.elapsed,
            rate: value.throughput(),
        }
    }
}

impl Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nops: {}, {:.2}/sec actual time: {:?}",
            self.admitted, self.rate, self.elapsed
        )?;
        if self.failed > 0 {
            write!(f, ", failed: {}", self.failed)?;
        }
        Ok(())
    }
}

impl Report for ThroughputReport {}

/// Prints the report as one human-readable line.
pub struct StdoutReporter;

impl<R: Report> Reporter<R> for StdoutReporter {
    async fn report(&self, report: &R) -> Result<(), Box<dyn std::error::Error>> {
        println!("{report}");
        Ok(())
    }
}

/// Prints the report as one JSON record.
pub struct JsonReporter;

impl<R: Report> Reporter<R> for JsonReporter {
    async fn report(&self, report: &R) -> Result<(), Box<dyn std::error::Error>> {
        let value = serde_json::to_string(report)?;
        println!("{value}");
        Ok(())
    }
}
