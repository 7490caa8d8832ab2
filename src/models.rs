//! Core data models for the voice ledger assistant

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Literal discriminator the oracle uses for a transaction directive.
pub const CREATE_TRANSACTION_ACTION: &str = "create_transaction";

/// Category used when a directive carries none.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Categories the oracle is instructed to map expenses onto.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "Housing",
    "Transportation",
    "Groceries",
    "Utilities",
    "Entertainment",
    "Food",
    "Shopping",
    "Healthcare",
    "Education",
    "Personal Care",
    "Travel",
    "Insurance",
    "Gifts & Donations",
    // Income side
    "Salary",
    "Other",
];

pub fn is_known_category(category: &str) -> bool {
    KNOWN_CATEGORIES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(category))
}

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Case-insensitive normalisation. Anything that is not "INCOME" is an expense.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some(label) if label.to_uppercase() == "INCOME" => TransactionType::Income,
            _ => TransactionType::Expense,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
        }
    }

    pub fn as_lowercase(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }

    /// Signed effect of `amount` on the owning account's balance.
    pub fn balance_change(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionType::Income => amount,
            TransactionType::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger rows are only written once the balance change commits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "COMPLETED",
        }
    }

    /// `None` for a status this ledger never writes
    pub fn from_db(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "COMPLETED" => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

//
// ================= Ledger =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Identity issued by the external auth provider
    pub external_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    /// Always positive; the sign comes from `transaction_type`
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Insert request handed to the persistence boundary.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Result of one atomic insert-and-rebalance.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub transaction: Transaction,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
}

//
// ================= Oracle Directive =================
//

/// Untrusted transaction proposal extracted from an oracle reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
    /// `None` when the directive's amount was missing or not numeric
    pub amount: Option<f64>,
    pub category: String,
    /// Normalised label, "INCOME" or "EXPENSE"
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub description: String,
}

//
// ================= Application Results =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub category: String,
    pub new_balance: Decimal,
}

impl Confirmation {
    pub fn message(&self) -> String {
        format!(
            "Added {} of {}",
            self.transaction_type.as_lowercase(),
            self.amount.normalize()
        )
    }
}

/// Uniform result shape returned across the applicator boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

impl ApplyOutcome {
    pub fn success(confirmation: Confirmation) -> Self {
        Self {
            success: true,
            message: Some(confirmation.message()),
            error: None,
            confirmation: Some(confirmation),
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            confirmation: None,
        }
    }
}

//
// ================= Oracle Context =================
//

/// Advisory snapshot of the user's finances sent along with a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialContext {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub recent_transactions: Vec<String>,
}
