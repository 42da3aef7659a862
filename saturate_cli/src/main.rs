use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use saturate::{
    BoundedDispatcher, ConnectionPool, Reporter,
    connection::line::{LineConnector, Procedure},
    dispatcher::{Budget, DeadlinePolicy},
    report::{JsonReporter, StdoutReporter, ThroughputReport},
    service,
};
use tokio::{net::TcpListener, runtime};
use tracing_subscriber::EnvFilter;

/// Measure the sustained call rate of a service under a cap on calls in flight.
#[derive(Debug, Parser)]
#[command(name = "saturate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the no-op/echo calibration service.
    Server(ServerArgs),
    /// Drive a service as fast as the concurrency budget allows.
    Client(ClientArgs),
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Runtime worker threads.
    #[arg(long, default_value_t = 2)]
    nprocs: usize,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Seconds to admit calls for. In-flight calls are waited for afterwards.
    #[arg(long, default_value_t = 2)]
    nsec: u64,
    /// Max outstanding calls.
    #[arg(long, default_value_t = 5000)]
    nmax: u32,
    /// Ignore --nmax and fan out without a cap (comparison baseline).
    #[arg(long)]
    unbounded: bool,
    /// Service host and port.
    #[arg(long, default_value = "localhost:8000")]
    cs: String,
    /// Number of connections.
    #[arg(long, default_value_t = 10)]
    nc: usize,
    /// Procedure to call.
    #[arg(long, value_enum, default_value_t = Experiment::Nothing)]
    exp: Experiment,
    /// How the end of the run is detected.
    #[arg(long, default_value_t = DeadlinePolicy::Poll)]
    deadline: DeadlinePolicy,
    /// Print the result as a JSON record.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Experiment {
    Nothing,
    Echo,
}

impl Experiment {
    fn request(self) -> Procedure {
        match self {
            Experiment::Nothing => Procedure::Nothing,
            Experiment::Echo => Procedure::Echo("hi".to_owned()),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Server(args) => {
            let rt = runtime::Builder::new_multi_thread()
                .worker_threads(args.nprocs.max(1))
                .enable_all()
                .build()
                .context("failed to build runtime")?;
            rt.block_on(server(args))
        }
        Command::Client(args) => {
            let rt = runtime::Builder::new_multi_thread()
                .worker_threads(num_cpus::get())
                .enable_all()
                .build()
                .context("failed to build runtime")?;
            rt.block_on(client(args))
        }
    }
}

async fn server(args: ServerArgs) -> Result<()> {
    let addr = format!("localhost:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    tracing::info!("Started server");
    service::serve(listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to wait for Ctrl-C: {e}");
            return;
        }
        tracing::info!("Caught signal");
    })
    .await
    .context("service failed")
}

async fn client(args: ClientArgs) -> Result<()> {
    let budget = if args.unbounded {
        Budget::Unbounded
    } else {
        Budget::Bounded(args.nmax)
    };
    // Reject a zero budget before dialing anything.
    budget.capacity().context("invalid --nmax")?;
    let dispatcher = BoundedDispatcher::builder()
        .budget(budget)
        .duration(Duration::from_secs(args.nsec))
        .deadline(args.deadline)
        .build();

    let pool = ConnectionPool::connect(&LineConnector, &args.cs, args.nc)
        .await
        .context("failed to build connection pool")?;

    let result = dispatcher
        .run(&pool, args.exp.request())
        .await
        .context("run failed")?;

    let report = ThroughputReport::from(result);
    let reported = if args.json {
        JsonReporter.report(&report).await
    } else {
        StdoutReporter.report(&report).await
    };
    reported.map_err(|e| anyhow::anyhow!("failed to write report: {e}"))
}
