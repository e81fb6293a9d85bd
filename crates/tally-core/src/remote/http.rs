//! REST client for the finance server.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{RemoteError, RemoteResult, RemoteService};
use crate::error::{Error, Result};
use crate::models::{
    AccountUpdateBody, BankAccount, Category, Direction, Transaction, TransactionRequestBody,
};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// `reqwest`-backed [`RemoteService`]
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&body).map_err(|error| RemoteError::Decode(error.to_string()))
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn fetch_transactions(
        &self,
        account_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RemoteResult<Vec<Transaction>> {
        let request = self
            .client
            .get(self.url(&format!("/transactions/account/{account_id}/period")))
            .query(&[
                ("startDate", from.format("%Y-%m-%d").to_string()),
                ("endDate", to.format("%Y-%m-%d").to_string()),
            ]);
        let items: Vec<TransactionResponse> = self.send_json(request).await?;
        items.into_iter().map(Transaction::try_from).collect()
    }

    async fn create_transaction(&self, body: &TransactionRequestBody) -> RemoteResult<i64> {
        let request = self.client.post(self.url("/transactions")).json(body);
        let created: CreatedResponse = self.send_json(request).await?;
        Ok(created.id)
    }

    async fn update_transaction(
        &self,
        id: i64,
        body: &TransactionRequestBody,
    ) -> RemoteResult<Transaction> {
        let request = self
            .client
            .put(self.url(&format!("/transactions/{id}")))
            .json(body);
        let updated: TransactionResponse = self.send_json(request).await?;
        updated.try_into()
    }

    async fn delete_transaction(&self, id: i64) -> RemoteResult<()> {
        let request = self.client.delete(self.url(&format!("/transactions/{id}")));
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_accounts(&self) -> RemoteResult<Vec<BankAccount>> {
        let items: Vec<AccountResponse> =
            self.send_json(self.client.get(self.url("/accounts"))).await?;
        items.into_iter().map(BankAccount::try_from).collect()
    }

    async fn create_account(&self, body: &AccountUpdateBody) -> RemoteResult<i64> {
        let request = self.client.post(self.url("/accounts")).json(body);
        let created: CreatedResponse = self.send_json(request).await?;
        Ok(created.id)
    }

    async fn update_account(&self, id: i64, body: &AccountUpdateBody) -> RemoteResult<BankAccount> {
        let request = self
            .client
            .put(self.url(&format!("/accounts/{id}")))
            .json(body);
        let updated: AccountResponse = self.send_json(request).await?;
        updated.try_into()
    }

    async fn delete_account(&self, id: i64) -> RemoteResult<()> {
        let request = self.client.delete(self.url(&format!("/accounts/{id}")));
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_categories(&self) -> RemoteResult<Vec<Category>> {
        let items: Vec<CategoryResponse> =
            self.send_json(self.client.get(self.url("/categories"))).await?;
        Ok(items.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct AccountBrief {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryResponse {
    id: i64,
    name: String,
    emoji: String,
    is_income: bool,
}

impl From<CategoryResponse> for Category {
    fn from(value: CategoryResponse) -> Self {
        Self {
            id: value.id,
            name: value.name,
            emoji: value.emoji,
            direction: if value.is_income {
                Direction::Income
            } else {
                Direction::Outcome
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    id: i64,
    account: AccountBrief,
    category: CategoryResponse,
    amount: String,
    transaction_date: String,
    #[serde(default)]
    comment: Option<String>,
}

impl TryFrom<TransactionResponse> for Transaction {
    type Error = RemoteError;

    fn try_from(value: TransactionResponse) -> RemoteResult<Self> {
        let category = Category::from(value.category);
        let body = TransactionRequestBody {
            account_id: value.account.id,
            category_id: category.id,
            amount: value.amount,
            transaction_date: value.transaction_date,
            comment: normalize_text_option(value.comment),
        };
        Self::from_request_body(value.id, category.direction, &body)
            .map_err(|error| RemoteError::Decode(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: i64,
    name: String,
    balance: String,
    currency: String,
}

impl TryFrom<AccountResponse> for BankAccount {
    type Error = RemoteError;

    fn try_from(value: AccountResponse) -> RemoteResult<Self> {
        let balance = Decimal::from_str(value.balance.trim()).map_err(|error| {
            RemoteError::Decode(format!("invalid balance '{}': {error}", value.balance))
        })?;
        Ok(Self {
            id: value.id,
            name: value.name,
            balance,
            currency: value.currency,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Private
// ---------------------------------------------------------------------------

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(message)
        }
        status if status.is_server_error() => RemoteError::Transient(message),
        status => RemoteError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() || error.is_connect() {
        RemoteError::Transient(error.to_string())
    } else if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("API base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_base_url_trims_and_validates() {
        assert_eq!(
            normalize_base_url(" https://api.example.com/v1/ ".to_string()).unwrap(),
            "https://api.example.com/v1"
        );
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn status_codes_map_to_failure_classes() {
        assert!(classify_status(StatusCode::CONFLICT, "").is_conflict());
        assert!(classify_status(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            RemoteError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad amount"),
            RemoteError::Rejected { status: 422, .. }
        ));
    }

    #[test]
    fn api_error_prefers_json_message() {
        assert_eq!(
            parse_api_error(
                StatusCode::CONFLICT,
                r#"{"message":"transaction was modified"}"#
            ),
            "transaction was modified (409)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn transaction_response_takes_direction_from_category() {
        let payload = r#"{
            "id": 42,
            "account": {"id": 1, "name": "Main", "balance": "100.00", "currency": "RUB"},
            "category": {"id": 3, "name": "Salary", "emoji": "💰", "isIncome": true},
            "amount": "100.00",
            "transactionDate": "2025-06-01T12:00:00.000Z",
            "comment": "  ",
            "createdAt": "2025-06-01T12:00:00.000Z"
        }"#;
        let response: TransactionResponse = serde_json::from_str(payload).unwrap();
        let transaction = Transaction::try_from(response).unwrap();

        assert_eq!(transaction.id, 42);
        assert_eq!(transaction.account_id, 1);
        assert_eq!(transaction.category_id, 3);
        assert_eq!(transaction.direction, Direction::Income);
        assert_eq!(transaction.amount, dec!(100.00));
        assert_eq!(transaction.comment, None);
    }

    #[test]
    fn account_response_rejects_bad_balance() {
        let response = AccountResponse {
            id: 1,
            name: "Main".to_string(),
            balance: "n/a".to_string(),
            currency: "RUB".to_string(),
        };
        assert!(matches!(
            BankAccount::try_from(response),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn debug_hides_client_internals() {
        let remote = HttpRemote::new("https://api.example.com", Duration::from_secs(1)).unwrap();
        let debug = format!("{remote:?}");
        assert!(debug.contains("https://api.example.com"));
        assert_eq!(remote.base_url(), "https://api.example.com");
    }
}
