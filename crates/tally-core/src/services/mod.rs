//! Domain services built on the local store, the remote service, and the sync engine.

mod accounts;
mod categories;
mod database;
mod transactions;

pub use accounts::BankAccountsService;
pub use categories::CategoriesService;
pub use database::DatabaseService;
pub use transactions::TransactionsService;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::BankAccount;
use crate::network::{Connectivity, ConnectivityFlag, NetworkAwareExecutor};
use crate::remote::RemoteService;
use crate::sync::{SyncOrchestrator, SyncStatusBroadcaster};

/// Collaborators shared by every domain service
#[derive(Clone)]
pub(crate) struct ServiceContext {
    pub db: DatabaseService,
    pub remote: Arc<dyn RemoteService>,
    pub executor: NetworkAwareExecutor,
    pub sync: Arc<SyncOrchestrator>,
}

impl ServiceContext {
    /// Run a sync pass before a fetch; failures are logged, not returned.
    pub async fn sync_before_fetch(&self) {
        if self.executor.is_connected() {
            if let Err(error) = self.sync.sync_all().await {
                tracing::warn!("Sync before fetch failed: {error}");
            }
        }
        if let Err(error) = self.sync.refresh_unsynced_count().await {
            tracing::warn!("Failed to refresh unsynced count: {error}");
        }
    }

    pub async fn require_account(&self, account_id: i64) -> Result<BankAccount> {
        self.db
            .get_account(account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {account_id}")))
    }
}

/// Fully wired engine: one store, one remote, one sync orchestrator.
pub struct Engine {
    context: ServiceContext,
    status: Arc<SyncStatusBroadcaster>,
    transactions: TransactionsService,
    accounts: BankAccountsService,
    categories: CategoriesService,
}

impl Engine {
    pub fn new(
        db: DatabaseService,
        remote: Arc<dyn RemoteService>,
        connectivity: Arc<dyn Connectivity>,
        stuck_after_attempts: u32,
    ) -> Self {
        let status = Arc::new(SyncStatusBroadcaster::new());
        let sync = Arc::new(
            SyncOrchestrator::new(db.clone(), remote.clone(), status.clone())
                .with_stuck_after_attempts(stuck_after_attempts),
        );
        let context = ServiceContext {
            executor: NetworkAwareExecutor::new(connectivity),
            db,
            remote,
            sync,
        };

        Self {
            transactions: TransactionsService::new(context.clone()),
            accounts: BankAccountsService::new(context.clone()),
            categories: CategoriesService::new(context.clone()),
            context,
            status,
        }
    }

    /// Build an engine from configuration, returning the connectivity flag it polls.
    pub fn from_config(
        db: DatabaseService,
        config: &EngineConfig,
    ) -> Result<(Self, Arc<ConnectivityFlag>)> {
        let remote = config.build_remote()?;
        let connectivity = Arc::new(ConnectivityFlag::new(
            !config.start_offline && config.api_base_url.is_some(),
        ));
        let engine = Self::new(db, remote, connectivity.clone(), config.stuck_after_attempts);
        Ok((engine, connectivity))
    }

    pub const fn transactions(&self) -> &TransactionsService {
        &self.transactions
    }

    pub const fn accounts(&self) -> &BankAccountsService {
        &self.accounts
    }

    pub const fn categories(&self) -> &CategoriesService {
        &self.categories
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.context.sync
    }

    pub const fn status(&self) -> &Arc<SyncStatusBroadcaster> {
        &self.status
    }

    pub const fn db(&self) -> &DatabaseService {
        &self.context.db
    }

    pub fn is_connected(&self) -> bool {
        self.context.executor.is_connected()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::FakeRemote;
    use rust_decimal::Decimal;

    pub struct TestEngine {
        pub engine: Engine,
        pub remote: Arc<FakeRemote>,
        pub connectivity: Arc<ConnectivityFlag>,
    }

    /// Engine over an in-memory store with account 1 seeded at a zero balance.
    pub async fn test_engine(connected: bool) -> TestEngine {
        let db = DatabaseService::open_in_memory().await.unwrap();
        db.upsert_account(&BankAccount {
            id: 1,
            name: "Main".to_string(),
            balance: Decimal::ZERO,
            currency: "USD".to_string(),
        })
        .await
        .unwrap();
        let remote = Arc::new(FakeRemote::new());
        let connectivity = Arc::new(ConnectivityFlag::new(connected));
        let engine = Engine::new(db, remote.clone(), connectivity.clone(), 3);
        TestEngine {
            engine,
            remote,
            connectivity,
        }
    }
}
