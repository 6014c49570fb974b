//! Types that represent the data of both ledgers, such as `SourceAccount` and `Transaction`.
mod amount;
pub mod destination;
pub mod source;

pub use amount::{Amount, AmountError};
pub use destination::{Account, Institution, NewTransaction, Transaction, TransactionAccount, User};
pub use source::{AccountStatus, AccountType, Balance, SourceAccount, SourceTransaction};
