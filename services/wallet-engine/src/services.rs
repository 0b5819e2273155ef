//! Transfer service: the only code path that moves value between balances.
//!
//! `create_token` debits the sender and mints a claimable token, `claim_token`
//! redeems it for the designated receiver, and `deposit` funds an account from
//! outside. Each one is a single atomic store operation; the service validates
//! input, enforces limits and records the outcome.

use crate::config::TransferConfig;
use crate::errors::{Result, WalletError};
use crate::metrics;
use crate::models::{
    BalanceResponse, BalanceUpdateResponse, ClaimTokenRequest, CreateTokenRequest,
    CreateTokenResponse, DepositRequest, LedgerEntry, NewTransfer, TransferToken,
};
use crate::store::WalletStore;
use crate::token_id;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

pub struct WalletService {
    store: Arc<dyn WalletStore>,
    limits: TransferConfig,
}

impl WalletService {
    pub fn new(store: Arc<dyn WalletStore>, limits: TransferConfig) -> Self {
        WalletService { store, limits }
    }

    /// Debit `sender` and mint a token claimable by `request.receiver`.
    pub async fn create_token(
        &self,
        sender: &str,
        request: CreateTokenRequest,
    ) -> Result<CreateTokenResponse> {
        let result = self.try_create_token(sender, request).await;
        if let Err(e) = &result {
            report_failure("create_token", e, sender, None);
        }
        result
    }

    async fn try_create_token(
        &self,
        sender: &str,
        request: CreateTokenRequest,
    ) -> Result<CreateTokenResponse> {
        request.validate()?;

        let receiver = request.receiver.trim();
        if receiver.is_empty() {
            return Err(WalletError::Validation(
                "Receiver address is required".to_string(),
            ));
        }
        self.check_amount(request.amount)?;
        if !self.limits.allowed_methods.contains(&request.method) {
            return Err(WalletError::Validation(format!(
                "Transfer method {} is not accepted",
                request.method
            )));
        }

        let sender_account = self
            .store
            .find_account(sender)
            .await?
            .filter(|a| !a.placeholder)
            .ok_or_else(|| WalletError::AccountNotFound(sender.to_string()))?;

        let receipt = self
            .store
            .create_transfer(NewTransfer {
                token_id: token_id::generate(),
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                amount: request.amount,
                method: request.method,
                created_at: Utc::now(),
            })
            .await?;

        metrics::TOKENS_CREATED.inc();
        metrics::TRANSFER_AMOUNT.observe(request.amount as f64);

        info!(
            token_id = %receipt.token.token_id,
            sender = %sender,
            receiver = %receipt.token.receiver,
            method = %receipt.token.method,
            "Created token for {} (sender balance now {})",
            receipt.token.amount, receipt.sender_balance
        );

        Ok(CreateTokenResponse {
            message: "Token created successfully".to_string(),
            token_id: receipt.token.token_id,
            amount: receipt.token.amount,
            timestamp: receipt.entry.created_at,
            sender_address: sender_account.address,
            name: sender_account.name,
        })
    }

    /// Redeem an active token for `claimant`, who must be its receiver.
    pub async fn claim_token(
        &self,
        claimant: &str,
        request: ClaimTokenRequest,
    ) -> Result<BalanceUpdateResponse> {
        let token_ref = request.token_id.clone();
        let result = self.try_claim_token(claimant, request).await;
        if let Err(e) = &result {
            report_failure("claim_token", e, claimant, Some(&token_ref));
        }
        result
    }

    async fn try_claim_token(
        &self,
        claimant: &str,
        request: ClaimTokenRequest,
    ) -> Result<BalanceUpdateResponse> {
        request.validate()?;

        let token_id = request.token_id.trim();
        if !token_id::is_well_formed(token_id) {
            return Err(WalletError::TokenNotFound(token_id.to_string()));
        }

        let receipt = self
            .store
            .claim_transfer(claimant, token_id, Utc::now())
            .await?;

        metrics::TOKENS_CLAIMED.inc();

        info!(
            token_id = %token_id,
            claimant = %claimant,
            "Claimed token worth {} (balance now {})",
            receipt.token.amount, receipt.balance
        );

        Ok(BalanceUpdateResponse {
            message: "Token claimed successfully".to_string(),
            balance: receipt.balance,
        })
    }

    /// Credit `address` from an external funding rail.
    pub async fn deposit(&self, address: &str, request: DepositRequest) -> Result<BalanceUpdateResponse> {
        let result = self.try_deposit(address, request).await;
        if let Err(e) = &result {
            report_failure("deposit", e, address, None);
        }
        result
    }

    async fn try_deposit(&self, address: &str, request: DepositRequest) -> Result<BalanceUpdateResponse> {
        request.validate()?;
        self.check_amount(request.amount)?;

        let receipt = self
            .store
            .deposit(address, request.amount, Utc::now())
            .await?;

        metrics::DEPOSITS.inc();

        info!(
            account = %address,
            "Deposited {} (balance now {})",
            request.amount, receipt.balance
        );

        Ok(BalanceUpdateResponse {
            message: "Deposit successful".to_string(),
            balance: receipt.balance,
        })
    }

    pub async fn get_balance(&self, address: &str) -> Result<BalanceResponse> {
        let account = self
            .store
            .find_account(address)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;

        Ok(BalanceResponse {
            address: account.address,
            balance: account.balance,
        })
    }

    /// Log entries of `address`, oldest first.
    pub async fn list_transactions(&self, address: &str) -> Result<Vec<LedgerEntry>> {
        self.store.list_transactions(address).await
    }

    /// A token as seen by one of its two parties. Anyone else gets
    /// `TokenNotFound`, so identifiers cannot be probed.
    pub async fn get_token(&self, caller: &str, token_id: &str) -> Result<TransferToken> {
        let token_id = token_id.trim();
        if !token_id::is_well_formed(token_id) {
            return Err(WalletError::TokenNotFound(token_id.to_string()));
        }

        self.store
            .find_token(token_id)
            .await?
            .filter(|t| t.sender == caller || t.receiver == caller)
            .ok_or_else(|| WalletError::TokenNotFound(token_id.to_string()))
    }

    fn check_amount(&self, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(WalletError::Validation(
                "Invalid amount: Amount must be a positive number".to_string(),
            ));
        }
        if amount > self.limits.max_amount {
            return Err(WalletError::Validation(format!(
                "Amount exceeds the per-operation limit of {}",
                self.limits.max_amount
            )));
        }
        Ok(())
    }
}

fn report_failure(operation: &str, err: &WalletError, account: &str, token_id: Option<&str>) {
    metrics::record_rejection(operation, err.error_type());

    match err {
        WalletError::Database(_) | WalletError::Internal(_) => error!(
            operation,
            account,
            token_id = token_id.unwrap_or("-"),
            "Storage failure, operation rolled back: {}",
            err
        ),
        _ => warn!(
            operation,
            account,
            token_id = token_id.unwrap_or("-"),
            "Rejected: {}",
            err
        ),
    }
}
