use crate::errors::{Result, WalletError, EMAIL_TAKEN};
use crate::models::{
    Account, ClaimReceipt, LedgerEntry, LedgerEntryKind, LedgerReceipt, NewAccount, NewTransfer,
    TokenStatus, TransferMethod, TransferReceipt, TransferToken,
};
use crate::store::WalletStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

/// PostgreSQL-backed wallet store. Each operation runs in one transaction.
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn append_entry(
        tx: &mut Transaction<'_, Postgres>,
        address: &str,
        kind: LedgerEntryKind,
        amount: i64,
        token_id: Option<&str>,
        method: Option<TransferMethod>,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (account_address, kind, amount, token_id, method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(address)
        .bind(kind)
        .bind(amount)
        .bind(token_id)
        .bind(method)
        .bind(at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(entry)
    }

    async fn credit(tx: &mut Transaction<'_, Postgres>, address: &str, amount: i64) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance + $1
            WHERE address = $2
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(address)
        .fetch_optional(&mut **tx)
        .await?;

        balance.ok_or_else(|| WalletError::AccountNotFound(address.to_string()))
    }
}

#[async_trait]
impl WalletStore for Database {
    async fn register_account(&self, account: NewAccount) -> Result<Account> {
        let (bank_account_number, ifsc_code, bank_name) = match account.bank_details {
            Some(details) if !details.is_empty() => {
                (details.account_number, details.ifsc_code, details.bank_name)
            }
            _ => (None, None, None),
        };

        // A placeholder row for this address is upgraded in place; a
        // registered one leaves the upsert without a returned row.
        let registered = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (
                address, email, name, mobile_no, pan_card, password_hash, mpin_hash,
                bank_account_number, ifsc_code, bank_name, balance, placeholder, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, FALSE, $11)
            ON CONFLICT (address) DO UPDATE SET
                name = EXCLUDED.name,
                mobile_no = EXCLUDED.mobile_no,
                pan_card = EXCLUDED.pan_card,
                password_hash = EXCLUDED.password_hash,
                mpin_hash = EXCLUDED.mpin_hash,
                bank_account_number = EXCLUDED.bank_account_number,
                ifsc_code = EXCLUDED.ifsc_code,
                bank_name = EXCLUDED.bank_name,
                placeholder = FALSE
            WHERE accounts.placeholder
            RETURNING *
            "#,
        )
        .bind(&account.address)
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.mobile_no)
        .bind(&account.pan_card)
        .bind(&account.password_hash)
        .bind(&account.mpin_hash)
        .bind(bank_account_number)
        .bind(ifsc_code)
        .bind(bank_name)
        .bind(account.created_at)
        .fetch_optional(&self.pool)
        .await?;

        registered.ok_or_else(|| WalletError::AccountExists(EMAIL_TAKEN.to_string()))
    }

    async fn find_account(&self, address: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT * FROM accounts WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_account_by_mobile(&self, mobile_no: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT * FROM accounts WHERE mobile_no = $1 AND NOT placeholder
            "#,
        )
        .bind(mobile_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_mpin(&self, address: &str, mpin_hash: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET mpin_hash = $1
            WHERE address = $2 AND NOT placeholder
            "#,
        )
        .bind(mpin_hash)
        .bind(address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WalletError::AccountNotFound(address.to_string()));
        }

        Ok(())
    }

    async fn deposit(&self, address: &str, amount: i64, at: DateTime<Utc>) -> Result<LedgerReceipt> {
        let mut tx = self.pool.begin().await?;

        let balance = Self::credit(&mut tx, address, amount).await?;
        let entry =
            Self::append_entry(&mut tx, address, LedgerEntryKind::Deposit, amount, None, None, at)
                .await?;

        tx.commit().await?;

        Ok(LedgerReceipt { entry, balance })
    }

    async fn create_transfer(&self, transfer: NewTransfer) -> Result<TransferReceipt> {
        let mut tx = self.pool.begin().await?;

        // Placeholder first: the upsert may wait on another transaction's
        // index entry for the receiver, so it must run before any row lock
        // is held here.
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (address, email, name, balance, placeholder, created_at)
            VALUES ($1, $1, 'Temporary User', 0, TRUE, $2)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(&transfer.receiver)
        .bind(transfer.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!(receiver = %transfer.receiver, "Created placeholder account");
        }

        // Both parties are locked in address order, so opposing transfers
        // between the same two accounts queue instead of deadlocking.
        sqlx::query(
            r#"
            SELECT address FROM accounts
            WHERE address IN ($1, $2)
            ORDER BY address
            FOR UPDATE
            "#,
        )
        .bind(&transfer.sender)
        .bind(&transfer.receiver)
        .fetch_all(&mut *tx)
        .await?;

        let debited: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance - $1
            WHERE address = $2 AND balance >= $1
            RETURNING balance
            "#,
        )
        .bind(transfer.amount)
        .bind(&transfer.sender)
        .fetch_optional(&mut *tx)
        .await?;

        let sender_balance = match debited {
            Some(balance) => balance,
            None => {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT balance FROM accounts WHERE address = $1")
                        .bind(&transfer.sender)
                        .fetch_optional(&mut *tx)
                        .await?;

                return Err(match available {
                    Some(available) => WalletError::InsufficientBalance {
                        required: transfer.amount,
                        available,
                    },
                    None => WalletError::AccountNotFound(transfer.sender.clone()),
                });
            }
        };

        let token = sqlx::query_as::<_, TransferToken>(
            r#"
            INSERT INTO transfer_tokens (token_id, sender, receiver, amount, method, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&transfer.token_id)
        .bind(&transfer.sender)
        .bind(&transfer.receiver)
        .bind(transfer.amount)
        .bind(transfer.method)
        .bind(TokenStatus::Active)
        .bind(transfer.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let entry = Self::append_entry(
            &mut tx,
            &transfer.sender,
            LedgerEntryKind::TokenSent,
            transfer.amount,
            Some(&transfer.token_id),
            Some(transfer.method),
            transfer.created_at,
        )
        .await?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE makes a concurrent claim wait here and then see the redeemed row
        let token = sqlx::query_as::<_, TransferToken>(
            r#"
            SELECT * FROM transfer_tokens WHERE token_id = $1 FOR UPDATE
            "#,
        )
        .bind(token_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| WalletError::TokenNotFound(token_id.to_string()))?;

        if token.receiver != claimant {
            return Err(WalletError::NotIntendedReceiver(token_id.to_string()));
        }

        if token.status == TokenStatus::Redeemed {
            return Err(WalletError::AlreadyRedeemed(token_id.to_string()));
        }

        let token = sqlx::query_as::<_, TransferToken>(
            r#"
            UPDATE transfer_tokens
            SET status = $1, redeemed_at = $2
            WHERE token_id = $3 AND status = $4
            RETURNING *
            "#,
        )
        .bind(TokenStatus::Redeemed)
        .bind(at)
        .bind(token_id)
        .bind(TokenStatus::Active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| WalletError::AlreadyRedeemed(token_id.to_string()))?;

        let balance = Self::credit(&mut tx, claimant, token.amount).await?;
        let entry = Self::append_entry(
            &mut tx,
            claimant,
            LedgerEntryKind::TokenReceived,
            token.amount,
            Some(token_id),
            Some(token.method),
            at,
        )
        .await?;

        tx.commit().await?;

        Ok(ClaimReceipt {
            token,
            entry,
            balance,
        })
    }

    async fn find_token(&self, token_id: &str) -> Result<Option<TransferToken>> {
        let token = sqlx::query_as::<_, TransferToken>(
            r#"
            SELECT * FROM transfer_tokens WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn list_transactions(&self, address: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM ledger_entries
            WHERE account_address = $1
            ORDER BY id ASC
            "#,
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
