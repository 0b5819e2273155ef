use crate::errors::{Result, WalletError};
use crate::models::{
    Account, LoginRequest, LoginResponse, NewAccount, RegisterRequest, UpdateMpinRequest,
    VerifyUserRequest, VerifyUserResponse,
};
use crate::security_middleware::jwt::JwtKeys;
use crate::security_middleware::password::{hash_secret, verify_secret};
use crate::store::WalletStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

pub struct AccountService {
    store: Arc<dyn WalletStore>,
    keys: Arc<JwtKeys>,
}

impl AccountService {
    pub fn new(store: Arc<dyn WalletStore>, keys: Arc<JwtKeys>) -> Self {
        AccountService { store, keys }
    }

    /// Register a new account; its address is the email.
    pub async fn register(&self, request: RegisterRequest) -> Result<Account> {
        request.validate()?;

        let address = request.email.trim().to_string();
        let password_hash = hash_secret(&request.password).await?;
        let mpin_hash = hash_secret(&request.mpin).await?;

        let account = self
            .store
            .register_account(NewAccount {
                address: address.clone(),
                email: address,
                name: request.name.trim().to_string(),
                mobile_no: request.mobile_no,
                pan_card: request.pan_card,
                password_hash,
                mpin_hash,
                bank_details: request.bank_details,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| {
                if let WalletError::AccountExists(reason) = &e {
                    warn!(reason = %reason, "Registration rejected: duplicate account");
                }
                e
            })?;

        info!(address = %account.address, "Registered account");
        Ok(account)
    }

    /// Exchange a mobile number and password for a session token.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        request.validate()?;

        let account = self
            .store
            .find_account_by_mobile(&request.mobile_no)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(request.mobile_no.clone()))?;

        let password_hash = account
            .password_hash
            .as_deref()
            .ok_or(WalletError::InvalidCredentials)?;

        if !verify_secret(&request.password, password_hash).await? {
            warn!(address = %account.address, "Login rejected: wrong password");
            return Err(WalletError::InvalidCredentials);
        }

        let token = self.keys.issue(&account.address)?;
        info!(address = %account.address, "Issued session token");

        Ok(LoginResponse {
            token,
            address: account.address,
        })
    }

    /// Confirm the caller's identity with either the current MPIN or the PAN
    /// on file. The MPIN wins when both are supplied.
    pub async fn verify_user(
        &self,
        address: &str,
        request: VerifyUserRequest,
    ) -> Result<VerifyUserResponse> {
        let account = self.registered(address).await?;

        let verified = match (request.old_mpin.as_deref(), request.pan_card.as_deref()) {
            (Some(mpin), _) if !mpin.is_empty() => match account.mpin_hash.as_deref() {
                Some(hash) => verify_secret(mpin, hash).await?,
                None => false,
            },
            (_, Some(pan)) if !pan.is_empty() => account.pan_card.as_deref() == Some(pan),
            _ => {
                return Err(WalletError::Validation(
                    "Please provide either old MPIN or PAN card number".to_string(),
                ))
            }
        };

        if !verified {
            warn!(address = %address, "Identity verification failed");
            return Err(WalletError::Validation(
                "Invalid MPIN or PAN card number".to_string(),
            ));
        }

        Ok(VerifyUserResponse { verified })
    }

    pub async fn update_mpin(&self, address: &str, request: UpdateMpinRequest) -> Result<()> {
        request.validate()?;
        self.registered(address).await?;

        let mpin_hash = hash_secret(&request.new_mpin).await?;
        self.store.update_mpin(address, &mpin_hash).await?;

        info!(address = %address, "MPIN updated");
        Ok(())
    }

    async fn registered(&self, address: &str) -> Result<Account> {
        self.store
            .find_account(address)
            .await?
            .filter(|a| !a.placeholder)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))
    }
}
