pub mod accounts;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod security_middleware;
pub mod services;
pub mod store;
pub mod token_id;

pub use config::Config;
pub use errors::{Result, WalletError};
