//! In-process wallet store.
//!
//! All state sits behind one mutex, so every operation is serialized and
//! applied as a unit: preconditions are checked before the first write and no
//! `.await` happens while the lock is held.

use crate::errors::{Result, WalletError, EMAIL_TAKEN, MOBILE_TAKEN, PAN_TAKEN};
use crate::models::{
    Account, ClaimReceipt, LedgerEntry, LedgerEntryKind, LedgerReceipt, NewAccount, NewTransfer,
    TokenStatus, TransferMethod, TransferReceipt, TransferToken,
};
use crate::store::WalletStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, TransferToken>,
    entries: Vec<LedgerEntry>,
}

impl State {
    fn append_entry(
        &mut self,
        address: &str,
        kind: LedgerEntryKind,
        amount: i64,
        token_id: Option<&str>,
        method: Option<TransferMethod>,
        at: DateTime<Utc>,
    ) -> LedgerEntry {
        let entry = LedgerEntry {
            id: self.entries.len() as i64 + 1,
            account_address: address.to_string(),
            kind,
            amount,
            token_id: token_id.map(str::to_string),
            method,
            created_at: at,
        };
        self.entries.push(entry.clone());
        entry
    }

    fn registered_conflict(&self, account: &NewAccount) -> Option<&'static str> {
        for existing in self.accounts.values().filter(|a| !a.placeholder) {
            if existing.address == account.address || existing.email == account.email {
                return Some(EMAIL_TAKEN);
            }
            if existing.mobile_no.as_deref() == Some(account.mobile_no.as_str()) {
                return Some(MOBILE_TAKEN);
            }
            if existing.pan_card.as_deref() == Some(account.pan_card.as_str()) {
                return Some(PAN_TAKEN);
            }
        }
        None
    }
}

/// Wallet store kept entirely in memory. Used for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances plus the amounts held by active tokens.
    pub fn total_value(&self) -> i64 {
        let state = self.state.lock();
        let balances: i64 = state.accounts.values().map(|a| a.balance).sum();
        let in_flight: i64 = state
            .tokens
            .values()
            .filter(|t| t.status == TokenStatus::Active)
            .map(|t| t.amount)
            .sum();
        balances + in_flight
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn register_account(&self, account: NewAccount) -> Result<Account> {
        let mut state = self.state.lock();

        if let Some(message) = state.registered_conflict(&account) {
            return Err(WalletError::AccountExists(message.to_string()));
        }

        let (bank_account_number, ifsc_code, bank_name) = match account.bank_details {
            Some(details) if !details.is_empty() => {
                (details.account_number, details.ifsc_code, details.bank_name)
            }
            _ => (None, None, None),
        };

        let balance = state
            .accounts
            .get(&account.address)
            .map_or(0, |placeholder| placeholder.balance);
        let created_at = state
            .accounts
            .get(&account.address)
            .map_or(account.created_at, |placeholder| placeholder.created_at);

        let registered = Account {
            address: account.address.clone(),
            email: account.email,
            name: account.name,
            mobile_no: Some(account.mobile_no),
            pan_card: Some(account.pan_card),
            password_hash: Some(account.password_hash),
            mpin_hash: Some(account.mpin_hash),
            bank_account_number,
            ifsc_code,
            bank_name,
            balance,
            placeholder: false,
            created_at,
        };

        state
            .accounts
            .insert(account.address, registered.clone());

        Ok(registered)
    }

    async fn find_account(&self, address: &str) -> Result<Option<Account>> {
        Ok(self.state.lock().accounts.get(address).cloned())
    }

    async fn find_account_by_mobile(&self, mobile_no: &str) -> Result<Option<Account>> {
        let state = self.state.lock();
        Ok(state
            .accounts
            .values()
            .find(|a| !a.placeholder && a.mobile_no.as_deref() == Some(mobile_no))
            .cloned())
    }

    async fn update_mpin(&self, address: &str, mpin_hash: &str) -> Result<()> {
        let mut state = self.state.lock();
        match state.accounts.get_mut(address) {
            Some(account) if !account.placeholder => {
                account.mpin_hash = Some(mpin_hash.to_string());
                Ok(())
            }
            _ => Err(WalletError::AccountNotFound(address.to_string())),
        }
    }

    async fn deposit(&self, address: &str, amount: i64, at: DateTime<Utc>) -> Result<LedgerReceipt> {
        let mut state = self.state.lock();

        let account = state
            .accounts
            .get_mut(address)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        let balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(WalletError::balance_overflow)?;
        account.balance = balance;

        let entry = state.append_entry(address, LedgerEntryKind::Deposit, amount, None, None, at);

        Ok(LedgerReceipt { entry, balance })
    }

    async fn create_transfer(&self, transfer: NewTransfer) -> Result<TransferReceipt> {
        let mut state = self.state.lock();

        let available = state
            .accounts
            .get(&transfer.sender)
            .map(|a| a.balance)
            .ok_or_else(|| WalletError::AccountNotFound(transfer.sender.clone()))?;

        if available < transfer.amount {
            return Err(WalletError::InsufficientBalance {
                required: transfer.amount,
                available,
            });
        }

        if state.tokens.contains_key(&transfer.token_id) {
            return Err(WalletError::Internal(format!(
                "Token identifier collision: {}",
                transfer.token_id
            )));
        }

        // All checks passed; from here on every write lands.
        let created_at = transfer.created_at;
        state
            .accounts
            .entry(transfer.receiver.clone())
            .or_insert_with(|| Account::placeholder(&transfer.receiver, created_at));

        let sender_balance = available - transfer.amount;
        if let Some(sender) = state.accounts.get_mut(&transfer.sender) {
            sender.balance = sender_balance;
        }

        let token = TransferToken {
            token_id: transfer.token_id.clone(),
            sender: transfer.sender.clone(),
            receiver: transfer.receiver.clone(),
            amount: transfer.amount,
            method: transfer.method,
            status: TokenStatus::Active,
            created_at,
            redeemed_at: None,
        };
        state.tokens.insert(token.token_id.clone(), token.clone());

        let entry = state.append_entry(
            &transfer.sender,
            LedgerEntryKind::TokenSent,
            transfer.amount,
            Some(&transfer.token_id),
            Some(transfer.method),
            created_at,
        );

        Ok(TransferReceipt {
            token,
            entry,
            sender_balance,
        })
    }

    async fn claim_transfer(
        &self,
        claimant: &str,
        token_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ClaimReceipt> {
        let mut state = self.state.lock();

        let token = state
            .tokens
            .get(token_id)
            .ok_or_else(|| WalletError::TokenNotFound(token_id.to_string()))?;

        if token.receiver != claimant {
            return Err(WalletError::NotIntendedReceiver(token_id.to_string()));
        }

        if token.status == TokenStatus::Redeemed {
            return Err(WalletError::AlreadyRedeemed(token_id.to_string()));
        }

        let (amount, method) = (token.amount, token.method);
        let current = state
            .accounts
            .get(claimant)
            .map(|a| a.balance)
            .ok_or_else(|| WalletError::AccountNotFound(claimant.to_string()))?;
        let balance = current
            .checked_add(amount)
            .ok_or_else(WalletError::balance_overflow)?;

        if let Some(account) = state.accounts.get_mut(claimant) {
            account.balance = balance;
        }

        let token = match state.tokens.get_mut(token_id) {
            Some(token) => {
                token.status = TokenStatus::Redeemed;
                token.redeemed_at = Some(at);
                token.clone()
            }
            None => return Err(WalletError::TokenNotFound(token_id.to_string())),
        };

        let entry = state.append_entry(
            claimant,
            LedgerEntryKind::TokenReceived,
            amount,
            Some(token_id),
            Some(method),
            at,
        );

        Ok(ClaimReceipt {
            token,
            entry,
            balance,
        })
    }

    async fn find_token(&self, token_id: &str) -> Result<Option<TransferToken>> {
        Ok(self.state.lock().tokens.get(token_id).cloned())
    }

    async fn list_transactions(&self, address: &str) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.account_address == address)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(address: &str, mobile_no: &str, pan_card: &str) -> NewAccount {
        NewAccount {
            address: address.to_string(),
            email: address.to_string(),
            name: "Test".to_string(),
            mobile_no: mobile_no.to_string(),
            pan_card: pan_card.to_string(),
            password_hash: "pw".to_string(),
            mpin_hash: "mpin".to_string(),
            bank_details: None,
            created_at: Utc::now(),
        }
    }

    fn transfer(id: &str, sender: &str, receiver: &str, amount: i64) -> NewTransfer {
        NewTransfer {
            token_id: id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            method: TransferMethod::Qr,
            created_at: Utc::now(),
        }
    }

    async fn funded(store: &MemoryStore, address: &str, amount: i64) {
        let n = store.state.lock().accounts.len();
        store
            .register_account(new_account(
                address,
                &format!("98765432{:02}", n),
                &format!("ABCDE{:04}F", n),
            ))
            .await
            .unwrap();
        store.deposit(address, amount, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_trace() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 100).await;

        let err = store
            .create_transfer(transfer("t1", "s@x.io", "r@x.io", 101))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WalletError::InsufficientBalance {
                required: 101,
                available: 100
            }
        ));
        assert!(store.find_account("r@x.io").await.unwrap().is_none());
        assert!(store.find_token("t1").await.unwrap().is_none());
        assert_eq!(store.list_transactions("s@x.io").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_sender_rejected() {
        let store = MemoryStore::new();
        let err = store
            .create_transfer(transfer("t1", "ghost@x.io", "r@x.io", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_placeholder_receiver_created() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 500).await;

        store
            .create_transfer(transfer("t1", "s@x.io", "new@x.io", 200))
            .await
            .unwrap();

        let receiver = store.find_account("new@x.io").await.unwrap().unwrap();
        assert!(receiver.placeholder);
        assert_eq!(receiver.balance, 0);
        assert!(receiver.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_registration_upgrades_placeholder() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 500).await;
        store
            .create_transfer(transfer("t1", "s@x.io", "new@x.io", 200))
            .await
            .unwrap();
        store.claim_transfer("new@x.io", "t1", Utc::now()).await.unwrap();

        let account = store
            .register_account(new_account("new@x.io", "9000000001", "ZZZZZ9999Z"))
            .await
            .unwrap();

        assert!(!account.placeholder);
        assert_eq!(account.balance, 200);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = MemoryStore::new();
        store
            .register_account(new_account("a@x.io", "9000000001", "AAAAA1111A"))
            .await
            .unwrap();

        let same_address = store
            .register_account(new_account("a@x.io", "9000000002", "BBBBB2222B"))
            .await;
        let same_mobile = store
            .register_account(new_account("b@x.io", "9000000001", "BBBBB2222B"))
            .await;
        let same_pan = store
            .register_account(new_account("b@x.io", "9000000002", "AAAAA1111A"))
            .await;

        assert!(matches!(same_address, Err(WalletError::AccountExists(m)) if m == EMAIL_TAKEN));
        assert!(matches!(same_mobile, Err(WalletError::AccountExists(m)) if m == MOBILE_TAKEN));
        assert!(matches!(same_pan, Err(WalletError::AccountExists(m)) if m == PAN_TAKEN));
    }

    #[tokio::test]
    async fn test_claim_check_order() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 500).await;
        store
            .create_transfer(transfer("t1", "s@x.io", "r@x.io", 200))
            .await
            .unwrap();

        assert!(matches!(
            store.claim_transfer("r@x.io", "nope", Utc::now()).await,
            Err(WalletError::TokenNotFound(_))
        ));
        store.claim_transfer("r@x.io", "t1", Utc::now()).await.unwrap();

        // A stranger sees the receiver mismatch even after redemption
        assert!(matches!(
            store.claim_transfer("s@x.io", "t1", Utc::now()).await,
            Err(WalletError::NotIntendedReceiver(_))
        ));
        assert!(matches!(
            store.claim_transfer("r@x.io", "t1", Utc::now()).await,
            Err(WalletError::AlreadyRedeemed(_))
        ));
    }

    #[tokio::test]
    async fn test_log_is_insertion_ordered() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 500).await;
        store
            .create_transfer(transfer("t1", "s@x.io", "r@x.io", 100))
            .await
            .unwrap();
        store.deposit("s@x.io", 50, Utc::now()).await.unwrap();

        let kinds: Vec<LedgerEntryKind> = store
            .list_transactions("s@x.io")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                LedgerEntryKind::Deposit,
                LedgerEntryKind::TokenSent,
                LedgerEntryKind::Deposit
            ]
        );
    }

    #[tokio::test]
    async fn test_total_value_tracks_deposits_only() {
        let store = MemoryStore::new();
        funded(&store, "s@x.io", 1000).await;
        assert_eq!(store.total_value(), 1000);

        store
            .create_transfer(transfer("t1", "s@x.io", "r@x.io", 300))
            .await
            .unwrap();
        assert_eq!(store.total_value(), 1000);

        store.claim_transfer("r@x.io", "t1", Utc::now()).await.unwrap();
        assert_eq!(store.total_value(), 1000);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_validation_error() {
        let store = MemoryStore::new();
        funded(&store, "whale@x.io", i64::MAX).await;
        funded(&store, "s@x.io", 10).await;

        let deposit = store.deposit("whale@x.io", 1, Utc::now()).await;
        assert!(matches!(
            deposit,
            Err(WalletError::Validation(m)) if m == crate::errors::BALANCE_OVERFLOW
        ));

        store
            .create_transfer(transfer("t1", "s@x.io", "whale@x.io", 10))
            .await
            .unwrap();
        let claim = store.claim_transfer("whale@x.io", "t1", Utc::now()).await;
        assert!(matches!(claim, Err(WalletError::Validation(_))));

        let whale = store.find_account("whale@x.io").await.unwrap().unwrap();
        assert_eq!(whale.balance, i64::MAX);
        assert_eq!(store.list_transactions("whale@x.io").await.unwrap().len(), 1);
        let token = store.find_token("t1").await.unwrap().unwrap();
        assert_eq!(token.status, TokenStatus::Active);
    }
}
