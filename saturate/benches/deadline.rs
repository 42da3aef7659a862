//! Cost of the two deadline policies on an in-memory no-op connection.
//!
//! Every admission attempt checks the deadline, so the check sits on the hot
//! path. This compares reading the clock (`Poll`) against reading a flag raised
//! by a timer task (`Timer`).

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use saturate::{
    BoundedDispatcher, CallError, Connection, ConnectionPool,
    dispatcher::{Budget, DeadlinePolicy},
};
use std::{hint::black_box, time::Duration};
use tokio::runtime::Runtime;

struct Noop;

impl Connection for Noop {
    type Request = ();
    type Response = ();

    async fn call(&mut self, _: &()) -> Result<(), CallError> {
        Ok(())
    }
}

const RUN_FOR: Duration = Duration::from_millis(20);

fn deadline_policies(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = ConnectionPool::from_connections((0..10).map(|_| Noop).collect()).unwrap();

    let mut group = c.benchmark_group("deadline_policy");
    group.sample_size(20);
    for policy in [DeadlinePolicy::Poll, DeadlinePolicy::Timer] {
        let dispatcher = BoundedDispatcher::builder()
            .budget(Budget::Bounded(5000))
            .duration(RUN_FOR)
            .deadline(policy)
            .build();

        group.bench_with_input(BenchmarkId::from_parameter(policy), &dispatcher, |b, d| {
            b.iter(|| {
                let result = rt.block_on(d.run(&pool, ())).unwrap();
                black_box(result.admitted)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, deadline_policies);
criterion_main!(benches);
