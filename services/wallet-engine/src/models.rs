use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use validator::{Validate, ValidationError};

lazy_static! {
    pub static ref MOBILE_NO_RE: Regex = Regex::new(r"^\d{10}$").unwrap();
    pub static ref PAN_CARD_RE: Regex = Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap();
    pub static ref MPIN_RE: Regex = Regex::new(r"^\d{6}$").unwrap();
    pub static ref BANK_ACCOUNT_RE: Regex = Regex::new(r"^\d{9,18}$").unwrap();
    pub static ref IFSC_CODE_RE: Regex = Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").unwrap();
}

/// Nominal presentation channel of a transfer. Carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    Qr,
    Bluetooth,
    Nfc,
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMethod::Qr => write!(f, "qr"),
            TransferMethod::Bluetooth => write!(f, "bluetooth"),
            TransferMethod::Nfc => write!(f, "nfc"),
        }
    }
}

/// Token status. `Active -> Redeemed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Redeemed,
}

/// Kind of a transaction log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_entry_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Deposit,
    TokenSent,
    TokenReceived,
}

/// Wallet account. The address is the account identity (the email at registration).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub email: String,
    pub name: String,
    pub mobile_no: Option<String>,
    #[serde(skip_serializing)]
    pub pan_card: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub mpin_hash: Option<String>,
    pub bank_account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub bank_name: Option<String>,
    pub balance: i64,
    /// Created on demand as the receiver of a transfer; holds no credentials.
    pub placeholder: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Zero-balance account standing in for a receiver that has not registered yet.
    pub fn placeholder(address: &str, created_at: DateTime<Utc>) -> Self {
        Account {
            address: address.to_string(),
            email: address.to_string(),
            name: "Temporary User".to_string(),
            mobile_no: None,
            pan_card: None,
            password_hash: None,
            mpin_hash: None,
            bank_account_number: None,
            ifsc_code: None,
            bank_name: None,
            balance: 0,
            placeholder: true,
            created_at,
        }
    }
}

/// Claimable transfer intent
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransferToken {
    pub token_id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: i64,
    pub method: TransferMethod,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// Append-only transaction log entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    #[serde(rename = "userAddress")]
    pub account_address: String,
    #[serde(rename = "type")]
    pub kind: LedgerEntryKind,
    pub amount: i64,
    pub token_id: Option<String>,
    pub method: Option<TransferMethod>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

// ========== Store inputs and receipts ==========

/// Credentials and profile of a registering account, already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub address: String,
    pub email: String,
    pub name: String,
    pub mobile_no: String,
    pub pan_card: String,
    pub password_hash: String,
    pub mpin_hash: String,
    pub bank_details: Option<BankDetails>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub token_id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: i64,
    pub method: TransferMethod,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a committed create: the minted token, the sender's log entry and balance.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub token: TransferToken,
    pub entry: LedgerEntry,
    pub sender_balance: i64,
}

/// Outcome of a committed claim
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub token: TransferToken,
    pub entry: LedgerEntry,
    pub balance: i64,
}

/// Outcome of a committed deposit
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    pub balance: i64,
}

// ========== Requests ==========

/// Accepts an amount either as a JSON integer or as a string of digits, as
/// browser forms tend to submit it.
pub fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(i64),
        Text(String),
    }

    match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => Ok(n),
        RawAmount::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("amount is not a whole number: {:?}", s))),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_bank_details_complete", skip_on_field_errors = false))]
pub struct BankDetails {
    #[validate(regex(path = "BANK_ACCOUNT_RE", message = "Account number must be between 9 and 18 digits"))]
    pub account_number: Option<String>,
    #[validate(regex(path = "IFSC_CODE_RE", message = "IFSC code must be in the format ABCD0XXXXXX"))]
    pub ifsc_code: Option<String>,
    pub bank_name: Option<String>,
}

impl BankDetails {
    /// True when no bank field carries a value.
    pub fn is_empty(&self) -> bool {
        [&self.account_number, &self.ifsc_code, &self.bank_name]
            .iter()
            .all(|f| f.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

fn validate_bank_details_complete(details: &BankDetails) -> std::result::Result<(), ValidationError> {
    let present = [&details.account_number, &details.ifsc_code, &details.bank_name]
        .iter()
        .filter(|f| f.as_deref().map_or(false, |v| !v.trim().is_empty()))
        .count();

    if present == 0 || present == 3 {
        Ok(())
    } else {
        let mut err = ValidationError::new("bank_details_incomplete");
        err.message = Some(
            "All bank details (account number, IFSC code, bank name) must be provided if linking a bank account"
                .into(),
        );
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    pub name: String,
    #[validate(regex(path = "MOBILE_NO_RE", message = "Mobile number must be 10 digits"))]
    pub mobile_no: String,
    #[validate(regex(path = "PAN_CARD_RE", message = "PAN card must be in the format ABCDE1234F"))]
    pub pan_card: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(regex(path = "MPIN_RE", message = "MPIN must be a 6-digit number"))]
    pub mpin: String,
    #[validate]
    pub bank_details: Option<BankDetails>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Mobile number is required"))]
    pub mobile_no: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserRequest {
    pub old_mpin: Option<String>,
    pub pan_card: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMpinRequest {
    #[validate(regex(path = "MPIN_RE", message = "New MPIN must be a 6-digit number"))]
    pub new_mpin: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DepositRequest {
    #[serde(deserialize_with = "deserialize_amount")]
    #[validate(range(min = 1, message = "Amount must be a positive number"))]
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateTokenRequest {
    #[validate(length(min = 1, message = "Receiver address is required"))]
    pub receiver: String,
    #[serde(deserialize_with = "deserialize_amount")]
    #[validate(range(min = 1, message = "Amount must be a positive number"))]
    pub amount: i64,
    pub method: TransferMethod,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTokenRequest {
    #[validate(length(min = 1, message = "Token ID is required"))]
    pub token_id: String,
}

// ========== Responses ==========

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub message: String,
    pub token_id: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
    pub sender_address: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceUpdateResponse {
    pub message: String,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyUserResponse {
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "asha@example.com".to_string(),
            name: "Asha".to_string(),
            mobile_no: "9876543210".to_string(),
            pan_card: "ABCDE1234F".to_string(),
            password: "correct horse".to_string(),
            mpin: "123456".to_string(),
            bank_details: None,
        }
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(register_request().validate().is_ok());
    }

    #[test]
    fn test_registration_field_formats() {
        let mut req = register_request();
        req.mobile_no = "98765".to_string();
        assert!(req.validate().is_err());

        let mut req = register_request();
        req.pan_card = "abcde1234f".to_string();
        assert!(req.validate().is_err());

        let mut req = register_request();
        req.mpin = "12345a".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_partial_bank_details_rejected() {
        let mut req = register_request();
        req.bank_details = Some(BankDetails {
            account_number: Some("123456789012".to_string()),
            ifsc_code: None,
            bank_name: None,
        });
        assert!(req.validate().is_err());

        req.bank_details = Some(BankDetails {
            account_number: Some("123456789012".to_string()),
            ifsc_code: Some("SBIN0001234".to_string()),
            bank_name: Some("State Bank".to_string()),
        });
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_bad_ifsc_rejected() {
        let mut req = register_request();
        req.bank_details = Some(BankDetails {
            account_number: Some("123456789012".to_string()),
            ifsc_code: Some("SBIN1001234".to_string()),
            bank_name: Some("State Bank".to_string()),
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_amount_accepts_number_or_digit_string() {
        let req: CreateTokenRequest =
            serde_json::from_str(r#"{"receiver":"r@x.io","amount":"300","method":"qr"}"#).unwrap();
        assert_eq!(req.amount, 300);

        let req: DepositRequest = serde_json::from_str(r#"{"amount":500}"#).unwrap();
        assert_eq!(req.amount, 500);

        assert!(serde_json::from_str::<DepositRequest>(r#"{"amount":"ten"}"#).is_err());
    }

    #[test]
    fn test_non_positive_amount_fails_validation() {
        let req = DepositRequest { amount: 0 };
        assert!(req.validate().is_err());

        let req = CreateTokenRequest {
            receiver: "r@x.io".to_string(),
            amount: -5,
            method: TransferMethod::Qr,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let parsed = serde_json::from_str::<CreateTokenRequest>(
            r#"{"receiver":"r@x.io","amount":1,"method":"carrier-pigeon"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_ledger_entry_wire_names() {
        let entry = LedgerEntry {
            id: 1,
            account_address: "s@x.io".to_string(),
            kind: LedgerEntryKind::TokenSent,
            amount: 300,
            token_id: Some("0xab".to_string()),
            method: Some(TransferMethod::Qr),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "token_sent");
        assert_eq!(value["userAddress"], "s@x.io");
        assert_eq!(value["method"], "qr");
        assert!(value.get("timestamp").is_some());
    }
}
