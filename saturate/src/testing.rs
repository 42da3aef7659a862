//! Instrumented fake connections shared by the unit tests.
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{CallError, Connection, ConnectionPool};

#[derive(Clone, Copy, Debug)]
pub(crate) enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Records how calls enter and leave the fake connections.
#[derive(Default)]
pub(crate) struct Probe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    order: Mutex<Vec<usize>>,
}

impl Probe {
    fn enter(&self, id: usize) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(id);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Calls currently executing.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever executing at once.
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Connection ids in the order calls started.
    pub(crate) fn order(&self) -> Vec<usize> {
        self.order.lock().unwrap().clone()
    }
}

pub(crate) struct FakeConnection {
    id: usize,
    latency: Duration,
    behavior: Behavior,
    probe: Arc<Probe>,
}

impl FakeConnection {
    pub(crate) fn new(id: usize, latency: Duration, behavior: Behavior, probe: Arc<Probe>) -> Self {
        Self {
            id,
            latency,
            behavior,
            probe,
        }
    }
}

impl Connection for FakeConnection {
    type Request = ();
    type Response = ();

    async fn call(&mut self, _: &()) -> Result<(), CallError> {
        self.probe.enter(self.id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.probe.exit();

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(CallError::Remote("induced failure".into())),
            Behavior::Panic => panic!("induced panic on connection {}", self.id),
        }
    }
}

/// A pool of `size` fake connections sharing one probe.
pub(crate) fn fake_pool(
    size: usize,
    latency: Duration,
    behavior: Behavior,
) -> (ConnectionPool<FakeConnection>, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let connections = (0..size)
        .map(|id| FakeConnection::new(id, latency, behavior, probe.clone()))
        .collect();
    let pool = ConnectionPool::from_connections(connections).unwrap();
    (pool, probe)
}
