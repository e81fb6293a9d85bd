//! Scripted in-memory remote used by unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    AccountUpdateBody, BankAccount, Category, Direction, Transaction, TransactionRequestBody,
};
use crate::remote::{RemoteError, RemoteResult, RemoteService};

#[derive(Default)]
struct FakeState {
    transactions: BTreeMap<i64, Transaction>,
    accounts: BTreeMap<i64, BankAccount>,
    categories: Vec<Category>,
    next_id: i64,
    failures: HashMap<String, VecDeque<RemoteError>>,
    calls: Vec<String>,
}

/// Server double: keeps rows in memory, fails calls on demand, records every call
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 42,
                ..FakeState::default()
            }),
        }
    }

    /// Make the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &str, error: RemoteError) {
        self.fail_call(method, error);
    }

    /// Fail one specific call, keyed as recorded in [`Self::calls`]
    /// (`"update_transaction:11"`).
    pub fn fail_call(&self, key: &str, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(key.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn set_next_id(&self, id: i64) {
        self.state.lock().unwrap().next_id = id;
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction);
    }

    pub fn insert_account(&self, account: BankAccount) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account);
    }

    pub fn insert_category(&self, category: Category) {
        self.state.lock().unwrap().categories.push(category);
    }

    pub fn transaction(&self, id: i64) -> Option<Transaction> {
        self.state.lock().unwrap().transactions.get(&id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn begin(&self, method: &'static str, detail: impl std::fmt::Display) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        let call = format!("{method}:{detail}");
        state.calls.push(call.clone());
        let scripted = state
            .failures
            .get_mut(&call)
            .and_then(VecDeque::pop_front)
            .or_else(|| state.failures.get_mut(method).and_then(VecDeque::pop_front));
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn direction_for(state: &FakeState, category_id: i64) -> Direction {
        state
            .categories
            .iter()
            .find(|category| category.id == category_id)
            .map_or(Direction::Outcome, |category| category.direction)
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn fetch_transactions(
        &self,
        account_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RemoteResult<Vec<Transaction>> {
        self.begin("fetch_transactions", account_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .values()
            .filter(|t| t.account_id == account_id)
            .filter(|t| {
                let day = t.transaction_date.date_naive();
                day >= from && day <= to
            })
            .cloned()
            .collect())
    }

    async fn create_transaction(&self, body: &TransactionRequestBody) -> RemoteResult<i64> {
        self.begin("create_transaction", &body.amount)?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let direction = Self::direction_for(&state, body.category_id);
        let transaction = Transaction::from_request_body(id, direction, body)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        state.transactions.insert(id, transaction);
        Ok(id)
    }

    async fn update_transaction(
        &self,
        id: i64,
        body: &TransactionRequestBody,
    ) -> RemoteResult<Transaction> {
        self.begin("update_transaction", id)?;
        let mut state = self.state.lock().unwrap();
        if !state.transactions.contains_key(&id) {
            return Err(RemoteError::NotFound(format!("transaction {id}")));
        }
        let direction = Self::direction_for(&state, body.category_id);
        let transaction = Transaction::from_request_body(id, direction, body)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        state.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn delete_transaction(&self, id: i64) -> RemoteResult<()> {
        self.begin("delete_transaction", id)?;
        match self.state.lock().unwrap().transactions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("transaction {id}"))),
        }
    }

    async fn fetch_accounts(&self) -> RemoteResult<Vec<BankAccount>> {
        self.begin("fetch_accounts", "")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .values()
            .cloned()
            .collect())
    }

    async fn create_account(&self, body: &AccountUpdateBody) -> RemoteResult<i64> {
        self.begin("create_account", &body.name)?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let account = BankAccount::from_update_body(id, body)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        state.accounts.insert(id, account);
        Ok(id)
    }

    async fn update_account(&self, id: i64, body: &AccountUpdateBody) -> RemoteResult<BankAccount> {
        self.begin("update_account", id)?;
        let mut state = self.state.lock().unwrap();
        if !state.accounts.contains_key(&id) {
            return Err(RemoteError::NotFound(format!("account {id}")));
        }
        let account = BankAccount::from_update_body(id, body)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn delete_account(&self, id: i64) -> RemoteResult<()> {
        self.begin("delete_account", id)?;
        match self.state.lock().unwrap().accounts.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("account {id}"))),
        }
    }

    async fn fetch_categories(&self) -> RemoteResult<Vec<Category>> {
        self.begin("fetch_categories", "")?;
        Ok(self.state.lock().unwrap().categories.clone())
    }
}
