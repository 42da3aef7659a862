use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Connection, Connector};
use crate::error::{CallError, ConfigError, ConnectionError, Error};

/// A fixed set of ready-to-use connections.
///
/// Connections are created once, reused for the whole run and never replaced:
/// there is no retry and no reconnection. A failed call surfaces its error to the
/// caller and the connection stays in the pool.
///
/// Cloning a pool is cheap and yields a handle to the same connections.
pub struct ConnectionPool<C> {
    slots: Arc<[PooledConnection<C>]>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<C: Connection> ConnectionPool<C> {
    /// Establish `size` connections to `addr`.
    ///
    /// All connections are dialed concurrently. The first failure aborts the
    /// whole pool: a partially built pool is never returned.
    pub async fn connect<K>(connector: &K, addr: &str, size: usize) -> Result<Self, Error>
    where
        K: Connector<Connection = C>,
    {
        if size == 0 {
            return Err(ConfigError::EmptyPool.into());
        }

        tracing::info!("Establishing {size} connections to {addr}...");
        let attempts = (0..size).map(|index| async move {
            let connection = connector
                .connect(addr)
                .await
                .map_err(|source| ConnectionError {
                    index,
                    addr: addr.to_owned(),
                    source,
                })?;
            tracing::debug!("Connection {index} established.");
            Ok::<_, ConnectionError>(connection)
        });
        let connections = try_join_all(attempts).await?;

        tracing::info!("All {size} connections to {addr} established.");
        Self::from_connections(connections)
    }

    /// Wrap connections that were established elsewhere.
    pub fn from_connections(connections: Vec<C>) -> Result<Self, Error> {
        if connections.is_empty() {
            return Err(ConfigError::EmptyPool.into());
        }

        let slots = connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| PooledConnection {
                index,
                connection: Arc::new(Mutex::new(connection)),
            })
            .collect();
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`: a pool holds at least one connection.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The connection a request token is assigned to: `token mod len`.
    pub fn index_for(&self, token: u64) -> usize {
        (token % self.slots.len() as u64) as usize
    }

    /// Handle to the connection assigned to `token`.
    pub fn slot_for(&self, token: u64) -> PooledConnection<C> {
        self.slots[self.index_for(token)].clone()
    }

    /// Handle to the connection at `index`, if there is one.
    pub fn get(&self, index: usize) -> Option<PooledConnection<C>> {
        self.slots.get(index).cloned()
    }

    /// Perform one call on the connection at `index`.
    ///
    /// Concurrent callers targeting the same connection are served one at a time,
    /// in the order they arrived. Returns `None` without calling anything if there
    /// is no connection at `index`.
    pub async fn call(
        &self,
        index: usize,
        request: &C::Request,
    ) -> Option<Result<C::Response, CallError>> {
        let slot = self.slots.get(index)?;
        Some(slot.call(request).await)
    }
}

/// Shared handle to one connection of a [`ConnectionPool`].
pub struct PooledConnection<C> {
    index: usize,
    connection: Arc<Mutex<C>>,
}

impl<C> Clone for PooledConnection<C> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<C: Connection> PooledConnection<C> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the connection to be free, then perform one call on it.
    pub async fn call(&self, request: &C::Request) -> Result<C::Response, CallError> {
        let mut connection = self.connection.lock().await;
        connection.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, FakeConnection, Probe};
    use std::{
        io,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct FlakyConnector {
        fail_on: usize,
        dialed: AtomicUsize,
        probe: Arc<Probe>,
    }

    impl Connector for FlakyConnector {
        type Connection = FakeConnection;

        async fn connect(&self, _addr: &str) -> io::Result<FakeConnection> {
            let n = self.dialed.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            Ok(FakeConnection::new(
                n,
                Duration::ZERO,
                Behavior::Succeed,
                self.probe.clone(),
            ))
        }
    }

    fn connector(fail_on: usize) -> FlakyConnector {
        FlakyConnector {
            fail_on,
            dialed: AtomicUsize::new(0),
            probe: Arc::new(Probe::default()),
        }
    }

    #[tokio::test]
    async fn connect_builds_requested_size() {
        let pool = ConnectionPool::connect(&connector(usize::MAX), "target:1", 5)
            .await
            .unwrap();

        assert_eq!(pool.len(), 5);
        assert!(pool.get(4).is_some());
        assert!(pool.get(5).is_none());
    }

    #[tokio::test]
    async fn zero_size_is_a_config_error() {
        let connector = connector(usize::MAX);
        let err = ConnectionPool::connect(&connector, "target:1", 0)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::Config(ConfigError::EmptyPool)));
        assert_eq!(connector.dialed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_failure_aborts_the_pool() {
        let err = ConnectionPool::connect(&connector(2), "target:1", 4)
            .await
            .err()
            .unwrap();

        match err {
            Error::Connection(e) => {
                assert_eq!(e.index, 2);
                assert_eq!(e.addr, "target:1");
                assert_eq!(e.source.kind(), io::ErrorKind::ConnectionRefused);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_connection_list_is_rejected() {
        let err = ConnectionPool::<FakeConnection>::from_connections(vec![])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::EmptyPool)));
    }

    #[test]
    fn tokens_map_round_robin() {
        let (pool, _) = crate::testing::fake_pool(3, Duration::ZERO, Behavior::Succeed);
        let assigned: Vec<usize> = (0..6).map(|t| pool.index_for(t)).collect();

        assert_eq!(assigned, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(pool.slot_for(7).index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_on_one_connection_are_serialized() {
        let (pool, probe) = crate::testing::fake_pool(1, Duration::from_millis(10), Behavior::Succeed);

        let calls = (0..4).map(|_| pool.call(0, &()));
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| matches!(r, Some(Ok(())))));
        assert_eq!(probe.calls(), 4);
        assert_eq!(probe.peak(), 1);
    }

    #[tokio::test]
    async fn call_out_of_range_is_none() {
        let (pool, probe) = crate::testing::fake_pool(2, Duration::ZERO, Behavior::Succeed);

        assert!(pool.call(2, &()).await.is_none());
        assert!(pool.call(usize::MAX, &()).await.is_none());
        assert!(matches!(pool.call(1, &()).await, Some(Ok(()))));
        assert_eq!(probe.calls(), 1);
    }
}
