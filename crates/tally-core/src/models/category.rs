//! Category model

use serde::{Deserialize, Serialize};

use super::Direction;

/// A spending or earning category; its direction decides the sign of transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub emoji: String,
    pub direction: Direction,
}

impl Category {
    #[must_use]
    pub const fn is_income(&self) -> bool {
        matches!(self.direction, Direction::Income)
    }
}
