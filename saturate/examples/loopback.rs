use std::time::Duration;

use saturate::{
    BoundedDispatcher, ConnectionPool, Reporter,
    connection::line::{LineConnector, Procedure},
    dispatcher::Budget,
    report::{StdoutReporter, ThroughputReport},
    service,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Run the calibration service in-process so the example is self-contained.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(service::serve(listener, std::future::pending()));

    // Dial once, reuse for every run.
    let pool = ConnectionPool::connect(&LineConnector, &addr, 10).await?;
    let dispatcher = BoundedDispatcher::builder()
        .budget(Budget::Bounded(5000))
        .duration(Duration::from_secs(2))
        .build();

    for request in [Procedure::Nothing, Procedure::Echo("hi".into())] {
        let result = dispatcher.run(&pool, request).await?;
        StdoutReporter.report(&ThroughputReport::from(result)).await?;
    }
    Ok(())
}
