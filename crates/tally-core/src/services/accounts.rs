//! Bank account operations with offline fallback.

use super::ServiceContext;
use crate::error::{Error, Result};
use crate::models::BankAccount;
use crate::network::ExecutionPath;
use crate::util::normalize_text_option;

pub struct BankAccountsService {
    context: ServiceContext,
}

impl BankAccountsService {
    pub(crate) const fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Refresh accounts from the server and return the requested one.
    ///
    /// Server accounts are not stored while local changes are queued; the
    /// locally maintained balance already includes them.
    pub async fn fetch_account(&self, account_id: i64) -> Result<BankAccount> {
        let ctx = &self.context;
        ctx.sync_before_fetch().await;

        let (accounts, path) = ctx
            .executor
            .execute_traced(
                "fetch accounts",
                || ctx.remote.fetch_accounts(),
                || ctx.db.list_accounts(),
            )
            .await?;
        if path == ExecutionPath::Remote {
            ctx.db.merge_server_accounts(&accounts).await?;
        }

        ctx.require_account(account_id).await
    }

    /// The account with the lowest id in the local store.
    pub async fn current_account(&self) -> Result<BankAccount> {
        self.context
            .db
            .list_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound("no account has been set up".to_string()))
    }

    pub async fn list_local(&self) -> Result<Vec<BankAccount>> {
        self.context.db.list_accounts().await
    }

    /// Update name, balance, or currency of a stored account.
    ///
    /// A server-confirmed balance is not stored while transaction changes are
    /// queued; the local balance already includes them.
    pub async fn update(&self, account: BankAccount) -> Result<BankAccount> {
        let ctx = &self.context;
        ctx.require_account(account.id).await?;
        let account = validated(account)?;

        if account.id < 0 {
            ctx.db.update_local_account(&account).await?;
            return Ok(account);
        }

        let body = account.to_update_body();
        let (stored, path) = ctx
            .executor
            .execute_traced(
                "update account",
                || ctx.remote.update_account(account.id, &body),
                || async {
                    ctx.db.update_local_account(&account).await?;
                    Ok(account.clone())
                },
            )
            .await?;

        if path == ExecutionPath::Remote {
            return ctx.db.store_synced_account(&stored).await;
        }
        Ok(stored)
    }

    /// Create an account, queueing it under a local id when the server is unavailable.
    pub async fn create(&self, account: BankAccount) -> Result<BankAccount> {
        let ctx = &self.context;
        let account = validated(account)?;
        let body = account.to_update_body();

        let (created, path) = ctx
            .executor
            .execute_traced(
                "create account",
                || async {
                    let id = ctx.remote.create_account(&body).await?;
                    Ok(BankAccount {
                        id,
                        ..account.clone()
                    })
                },
                || ctx.db.create_local_account(&account),
            )
            .await?;

        if path == ExecutionPath::Remote {
            ctx.db.store_synced_account(&created).await?;
        }
        tracing::info!("Created account {} ({})", created.id, created.name);
        Ok(created)
    }

    /// Delete an account that no longer has transactions.
    pub async fn delete(&self, id: i64) -> Result<BankAccount> {
        let ctx = &self.context;
        let existing = ctx.require_account(id).await?;
        if !ctx.db.list_account_transactions(id).await?.is_empty() {
            return Err(Error::InvalidInput(format!(
                "account {id} still has transactions"
            )));
        }

        if id < 0 {
            ctx.db.delete_local_account(id).await?;
            return Ok(existing);
        }

        let ((), path) = ctx
            .executor
            .execute_traced(
                "delete account",
                || async {
                    match ctx.remote.delete_account(id).await {
                        Err(error) if error.is_not_found() => Ok(()),
                        other => other,
                    }
                },
                || async {
                    ctx.db.delete_local_account(id).await?;
                    Ok(())
                },
            )
            .await?;

        if path == ExecutionPath::Remote {
            ctx.db.remove_synced_account(id).await?;
        }
        Ok(existing)
    }

    /// Seed an account in the local store without queueing anything.
    pub async fn create_local(&self, account: BankAccount) -> Result<BankAccount> {
        let account = validated(account)?;
        self.context.db.upsert_account(&account).await?;
        tracing::info!("Created local account {} ({})", account.id, account.name);
        Ok(account)
    }
}

fn validated(account: BankAccount) -> Result<BankAccount> {
    let name = normalize_text_option(Some(account.name))
        .ok_or_else(|| Error::InvalidInput("account name must not be empty".to_string()))?;
    let currency = normalize_text_option(Some(account.currency))
        .map(|currency| currency.to_ascii_uppercase())
        .ok_or_else(|| Error::InvalidInput("currency must not be empty".to_string()))?;
    Ok(BankAccount {
        name,
        currency,
        ..account
    })
}
