//! Execute-with-fallback over a connectivity oracle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::remote::RemoteError;

/// Answers whether the server is believed reachable right now
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Connectivity flag flipped by whoever watches the network
#[derive(Debug)]
pub struct ConnectivityFlag(AtomicBool);

impl ConnectivityFlag {
    #[must_use]
    pub const fn new(connected: bool) -> Self {
        Self(AtomicBool::new(connected))
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.0.swap(connected, Ordering::SeqCst);
        if previous != connected {
            tracing::info!(
                "Connectivity changed: {}",
                if connected { "online" } else { "offline" }
            );
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which path produced an executor result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Remote,
    Fallback,
}

/// Runs a remote operation, substituting a local one when offline or on any remote failure
#[derive(Clone)]
pub struct NetworkAwareExecutor {
    connectivity: Arc<dyn Connectivity>,
}

impl NetworkAwareExecutor {
    pub fn new(connectivity: Arc<dyn Connectivity>) -> Self {
        Self { connectivity }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    /// Try `remote`, falling back to `fallback`.
    ///
    /// `remote` is skipped when offline. Every remote failure, whatever its
    /// class, triggers the fallback. Fallback errors propagate unchanged.
    pub async fn execute_with_fallback<T, R, RF, F, FF>(
        &self,
        label: &str,
        remote: R,
        fallback: F,
    ) -> Result<T>
    where
        R: FnOnce() -> RF,
        RF: Future<Output = std::result::Result<T, RemoteError>>,
        F: FnOnce() -> FF,
        FF: Future<Output = Result<T>>,
    {
        self.execute_traced(label, remote, fallback)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`Self::execute_with_fallback`], also reporting which path ran.
    pub async fn execute_traced<T, R, RF, F, FF>(
        &self,
        label: &str,
        remote: R,
        fallback: F,
    ) -> Result<(T, ExecutionPath)>
    where
        R: FnOnce() -> RF,
        RF: Future<Output = std::result::Result<T, RemoteError>>,
        F: FnOnce() -> FF,
        FF: Future<Output = Result<T>>,
    {
        if !self.connectivity.is_connected() {
            tracing::debug!("{label}: offline, using local fallback");
            return Ok((fallback().await?, ExecutionPath::Fallback));
        }

        match remote().await {
            Ok(value) => Ok((value, ExecutionPath::Remote)),
            Err(error) => {
                tracing::warn!(
                    "{label}: remote call failed ({:?}): {error}; using local fallback",
                    error.class()
                );
                Ok((fallback().await?, ExecutionPath::Fallback))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    fn executor(connected: bool) -> (NetworkAwareExecutor, Arc<ConnectivityFlag>) {
        let flag = Arc::new(ConnectivityFlag::new(connected));
        (NetworkAwareExecutor::new(flag.clone()), flag)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_result_wins_when_online() {
        let (executor, _) = executor(true);
        let (value, path) = executor
            .execute_traced("test", || async { Ok(1) }, || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(path, ExecutionPath::Remote);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_skips_remote_entirely() {
        let (executor, flag) = executor(true);
        flag.set_connected(false);
        let remote_calls = AtomicUsize::new(0);

        let value = executor
            .execute_with_fallback(
                "test",
                || async {
                    remote_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                },
                || async { Ok(2) },
            )
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_remote_failure_falls_back() {
        let (executor, _) = executor(true);
        for error in [
            RemoteError::Conflict("c".into()),
            RemoteError::NotFound("n".into()),
            RemoteError::Transient("t".into()),
            RemoteError::Decode("d".into()),
        ] {
            let (value, path) = executor
                .execute_traced("test", move || async move { Err(error) }, || async { Ok(7) })
                .await
                .unwrap();
            assert_eq!(value, 7);
            assert_eq!(path, ExecutionPath::Fallback);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fallback_error_propagates() {
        let (executor, _) = executor(false);
        let result: Result<i32> = executor
            .execute_with_fallback(
                "test",
                || async { Ok(1) },
                || async { Err(Error::Database("disk full".into())) },
            )
            .await;
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
