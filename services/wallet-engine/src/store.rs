//! Persistence port for accounts, transfer tokens and the transaction log.
//!
//! Every state-changing method is one atomic unit: either all of its writes
//! persist or none do. Preconditions are checked inside that unit, so two
//! operations racing on the same balance or token are serialized by the
//! store rather than by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::models::{
    Account, ClaimReceipt, LedgerEntry, LedgerReceipt, NewAccount, NewTransfer, TransferReceipt,
    TransferToken,
};

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Insert a registered account, or upgrade a placeholder with the same
    /// address in place (keeping its balance). Fails with `AccountExists` when
    /// the address, mobile number or PAN already belongs to a registered account.
    async fn register_account(&self, account: NewAccount) -> Result<Account>;

    async fn find_account(&self, address: &str) -> Result<Option<Account>>;

    async fn find_account_by_mobile(&self, mobile_no: &str) -> Result<Option<Account>>;

    /// Replace the MPIN hash of a registered account.
    async fn update_mpin(&self, address: &str, mpin_hash: &str) -> Result<()>;

    /// Credit `amount` and append a `deposit` entry.
    async fn deposit(&self, address: &str, amount: i64, at: DateTime<Utc>) -> Result<LedgerReceipt>;

    /// Create the receiver placeholder if needed, debit the sender, mint the
    /// token in `active` status and append the sender's `token_sent` entry.
    async fn create_transfer(&self, transfer: NewTransfer) -> Result<TransferReceipt>;

    /// Redeem an active token for its receiver: credit the claimant, mark the
    /// token `redeemed` and append a `token_received` entry. Rejections are
    /// checked in order: unknown token, receiver mismatch, already redeemed.
    async fn claim_transfer(
        &self,
        claimant: &str,
        token_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ClaimReceipt>;

    async fn find_token(&self, token_id: &str) -> Result<Option<TransferToken>>;

    /// All log entries of `address`, oldest first.
    async fn list_transactions(&self, address: &str) -> Result<Vec<LedgerEntry>>;
}
