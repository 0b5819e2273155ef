//! Property-based tests for wallet invariants
//!
//! - Conservation: balances plus active token amounts equal total deposits
//! - No account balance ever goes negative
//! - A token is redeemed at most once

use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use wallet_engine::{
    config::TransferConfig,
    memory::MemoryStore,
    models::{
        ClaimTokenRequest, CreateTokenRequest, DepositRequest, NewAccount, TransferMethod,
    },
    services::WalletService,
    store::WalletStore,
};

const USERS: [&str; 3] = ["a@wallet.in", "b@wallet.in", "c@wallet.in"];

#[derive(Debug, Clone)]
enum Op {
    Deposit { user: usize, amount: i64 },
    Create { from: usize, to: usize, amount: i64 },
    Claim { token: usize, by: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..USERS.len(), 1i64..5_000).prop_map(|(user, amount)| Op::Deposit { user, amount }),
        (0..USERS.len(), 0..USERS.len(), 1i64..3_000)
            .prop_map(|(from, to, amount)| Op::Create { from, to, amount }),
        (0usize..32, 0..USERS.len()).prop_map(|(token, by)| Op::Claim { token, by }),
    ]
}

async fn seeded() -> (WalletService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for (i, user) in USERS.iter().enumerate() {
        store
            .register_account(NewAccount {
                address: user.to_string(),
                email: user.to_string(),
                name: format!("User {}", i),
                mobile_no: format!("900000000{}", i),
                pan_card: format!("ABCDE123{}F", i),
                password_hash: "pw".to_string(),
                mpin_hash: "mpin".to_string(),
                bank_details: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let service = WalletService::new(store.clone(), TransferConfig::default());
    (service, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: value is only moved, never created or lost
    #[test]
    fn prop_value_is_conserved(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (service, store) = seeded().await;
            let mut deposited = 0i64;
            let mut tokens: Vec<String> = Vec::new();
            let mut redeemed: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Deposit { user, amount } => {
                        if service
                            .deposit(USERS[user], DepositRequest { amount })
                            .await
                            .is_ok()
                        {
                            deposited += amount;
                        }
                    }
                    Op::Create { from, to, amount } => {
                        let result = service
                            .create_token(
                                USERS[from],
                                CreateTokenRequest {
                                    receiver: USERS[to].to_string(),
                                    amount,
                                    method: TransferMethod::Nfc,
                                },
                            )
                            .await;
                        if let Ok(created) = result {
                            tokens.push(created.token_id);
                        }
                    }
                    Op::Claim { token, by } => {
                        if tokens.is_empty() {
                            continue;
                        }
                        let token_id = tokens[token % tokens.len()].clone();
                        let result = service
                            .claim_token(USERS[by], ClaimTokenRequest { token_id: token_id.clone() })
                            .await;
                        if result.is_ok() {
                            prop_assert!(!redeemed.contains(&token_id));
                            redeemed.push(token_id);
                        }
                    }
                }

                prop_assert_eq!(store.total_value(), deposited);
                for user in USERS {
                    let balance = service.get_balance(user).await.unwrap().balance;
                    prop_assert!(balance >= 0);
                }
            }
            Ok(())
        })?;
    }

    /// Property: a create that exceeds the balance changes nothing
    #[test]
    fn prop_overdraw_leaves_no_trace(balance in 0i64..10_000, extra in 1i64..10_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (service, store) = seeded().await;
            if balance > 0 {
                service
                    .deposit(USERS[0], DepositRequest { amount: balance })
                    .await
                    .unwrap();
            }
            let before = store.list_transactions(USERS[0]).await.unwrap().len();

            let result = service
                .create_token(
                    USERS[0],
                    CreateTokenRequest {
                        receiver: USERS[1].to_string(),
                        amount: balance + extra,
                        method: TransferMethod::Qr,
                    },
                )
                .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(service.get_balance(USERS[0]).await.unwrap().balance, balance);
            prop_assert_eq!(store.list_transactions(USERS[0]).await.unwrap().len(), before);
            prop_assert_eq!(store.total_value(), balance);
            Ok(())
        })?;
    }
}
