//! Bank account model

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An account whose balance is kept as a stored running total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: i64,
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
}

impl BankAccount {
    #[must_use]
    pub fn to_update_body(&self) -> AccountUpdateBody {
        AccountUpdateBody {
            name: self.name.clone(),
            balance: self.balance.to_string(),
            currency: self.currency.clone(),
        }
    }

    pub fn from_update_body(id: i64, body: &AccountUpdateBody) -> Result<Self> {
        Ok(Self {
            id,
            name: body.name.clone(),
            balance: Decimal::from_str(body.balance.trim())?,
            currency: body.currency.clone(),
        })
    }
}

/// Wire body for account create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateBody {
    pub name: String,
    /// Decimal balance as text
    pub balance: String,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_body_keeps_exact_balance() {
        let account = BankAccount {
            id: 7,
            name: "Main".to_string(),
            balance: dec!(1000.10),
            currency: "USD".to_string(),
        };
        let body = account.to_update_body();
        assert_eq!(body.balance, "1000.10");
        assert_eq!(BankAccount::from_update_body(7, &body).unwrap(), account);
    }

    #[test]
    fn from_update_body_rejects_bad_balance() {
        let body = AccountUpdateBody {
            name: "Main".to_string(),
            balance: "lots".to_string(),
            currency: "USD".to_string(),
        };
        assert!(BankAccount::from_update_body(1, &body).is_err());
    }
}
