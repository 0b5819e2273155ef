use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Token already claimed: {0}")]
    AlreadyRedeemed(String),

    #[error("You are not the intended receiver of token {0}")]
    NotIntendedReceiver(String),

    #[error("{0}")]
    AccountExists(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub const EMAIL_TAKEN: &str = "Email address already registered";
pub const MOBILE_TAKEN: &str = "Mobile number already registered";
pub const PAN_TAKEN: &str = "PAN card already registered";
pub const BALANCE_OVERFLOW: &str = "Amount would overflow the account balance";

/// SQLSTATE for `numeric_value_out_of_range`
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Client-facing text for the account uniqueness constraints. Any other
/// unique violation is a storage fault, not a duplicate registration.
pub fn duplicate_account_message(constraint: &str) -> Option<&'static str> {
    match constraint {
        "accounts_pkey" | "accounts_email_key" => Some(EMAIL_TAKEN),
        "accounts_mobile_no_key" => Some(MOBILE_TAKEN),
        "accounts_pan_card_key" => Some(PAN_TAKEN),
        _ => None,
    }
}

impl WalletError {
    /// A credit that would push a balance past `i64::MAX`.
    pub fn balance_overflow() -> Self {
        WalletError::Validation(BALANCE_OVERFLOW.to_string())
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                if let Some(message) = db_err.constraint().and_then(duplicate_account_message) {
                    return WalletError::AccountExists(message.to_string());
                }
            } else if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
                return WalletError::balance_overflow();
            }
        }
        WalletError::Database(err)
    }
}

impl From<validator::ValidationErrors> for WalletError {
    fn from(errs: validator::ValidationErrors) -> Self {
        WalletError::Validation(describe_validation_errors(&errs))
    }
}

impl From<argon2::password_hash::Error> for WalletError {
    fn from(err: argon2::password_hash::Error) -> Self {
        WalletError::PasswordHash(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Flattens validator output into the first human-readable message per field.
fn describe_validation_errors(errs: &validator::ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_messages(errs, &mut messages);
    if messages.is_empty() {
        "Invalid request".to_string()
    } else {
        messages.join("; ")
    }
}

fn collect_messages(errs: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errs.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    match &e.message {
                        Some(msg) => out.push(msg.to_string()),
                        None => out.push(format!("{} is invalid", field)),
                    }
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_messages(inner, out),
            ValidationErrorsKind::List(items) => {
                for inner in items.values() {
                    collect_messages(inner, out);
                }
            }
        }
    }
}

impl ResponseError for WalletError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Storage and internal details stay in the logs
        let error_message = match self {
            WalletError::Database(_)
            | WalletError::Migration(_)
            | WalletError::PasswordHash(_)
            | WalletError::Internal(_) => "Internal server error".to_string(),
            WalletError::Jwt(_) => "Invalid or expired token".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WalletError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::TokenNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            WalletError::AlreadyRedeemed(_) => StatusCode::CONFLICT,
            WalletError::NotIntendedReceiver(_) => StatusCode::FORBIDDEN,
            WalletError::AccountExists(_) => StatusCode::CONFLICT,
            WalletError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            WalletError::Unauthorized => StatusCode::UNAUTHORIZED,
            WalletError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletError::Jwt(_) => StatusCode::UNAUTHORIZED,
            WalletError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl WalletError {
    pub fn error_type(&self) -> &str {
        match self {
            WalletError::Database(_) => "database_error",
            WalletError::Migration(_) => "database_error",
            WalletError::Validation(_) => "validation_error",
            WalletError::AccountNotFound(_) => "not_found",
            WalletError::TokenNotFound(_) => "not_found",
            WalletError::InsufficientBalance { .. } => "insufficient_balance",
            WalletError::AlreadyRedeemed(_) => "already_redeemed",
            WalletError::NotIntendedReceiver(_) => "not_intended_receiver",
            WalletError::AccountExists(_) => "duplicate_error",
            WalletError::InvalidCredentials => "invalid_credentials",
            WalletError::Unauthorized => "unauthorized",
            WalletError::PasswordHash(_) => "internal_error",
            WalletError::Jwt(_) => "unauthorized",
            WalletError::Internal(_) => "internal_error",
        }
    }
}
