//! Types sent to and received from the PocketSmith API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The account kind used for every account this tool creates.
pub const ACCOUNT_KIND_BANK: &str = "bank";

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub currency_code: String,
}

/// The ledger-side sub-entity of an account that holds the balance and the transactions.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionAccount {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub currency_code: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub current_balance: Option<Decimal>,
    pub institution: Institution,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub currency_code: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub current_balance: Option<Decimal>,
    pub primary_transaction_account: TransactionAccount,
}

impl Account {
    pub fn transaction_account_id(&self) -> u64 {
        self.primary_transaction_account.id
    }

    pub fn institution_id(&self) -> u64 {
        self.primary_transaction_account.institution.id
    }

    /// The cached balance. PocketSmith omits it for accounts that have never had one.
    pub fn balance(&self) -> Decimal {
        self.current_balance
            .or(self.primary_transaction_account.current_balance)
            .unwrap_or_default()
    }
}

/// A transaction that exists at the destination.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub payee: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_transfer: bool,
    #[serde(default)]
    pub memo: Option<String>,
}

/// The body of a transaction creation request.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub payee: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub date: NaiveDate,
    pub is_transfer: bool,
    pub memo: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct NewInstitution<'a> {
    pub(crate) title: &'a str,
    pub(crate) currency_code: &'a str,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct NewAccount<'a> {
    pub(crate) institution_id: u64,
    pub(crate) title: &'a str,
    pub(crate) currency_code: &'a str,
    #[serde(rename = "type")]
    pub(crate) kind: &'a str,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct BalanceUpdate {
    pub(crate) institution_id: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub(crate) starting_balance: Decimal,
    pub(crate) starting_balance_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ACCOUNT_JSON: &str = r#"{
        "id": 301,
        "title": "Everyday",
        "currency_code": "aud",
        "type": "bank",
        "current_balance": 480.25,
        "primary_transaction_account": {
            "id": 9001,
            "name": "Everyday",
            "currency_code": "aud",
            "current_balance": 480.25,
            "institution": {"id": 55, "title": "Example Bank", "currency_code": "aud"}
        }
    }"#;

    #[test]
    fn test_deserialize_account() {
        let account: Account = serde_json::from_str(ACCOUNT_JSON).unwrap();
        assert_eq!(account.transaction_account_id(), 9001);
        assert_eq!(account.institution_id(), 55);
        assert_eq!(account.balance(), Decimal::from_str("480.25").unwrap());
    }

    #[test]
    fn test_missing_balance_is_zero() {
        let json = ACCOUNT_JSON.replace("\"current_balance\": 480.25,", "");
        let account: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(account.balance(), Decimal::ZERO);
    }

    #[test]
    fn test_serialize_new_transaction() {
        let tx = NewTransaction {
            payee: "CAFE".into(),
            amount: Decimal::from_str("-12.5").unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            is_transfer: false,
            memo: "REF-1".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["amount"], serde_json::json!(-12.5));
        assert_eq!(json["date"], "2025-01-07");
        assert_eq!(json["memo"], "REF-1");
    }

    #[test]
    fn test_serialize_new_account_kind() {
        let body = NewAccount {
            institution_id: 5,
            title: "Everyday",
            currency_code: "aud",
            kind: ACCOUNT_KIND_BANK,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "bank");
    }
}
