use crate::accounts::AccountService;
use crate::errors::WalletError;
use crate::metrics;
use crate::models::{
    ClaimTokenRequest, CreateTokenRequest, DepositRequest, LoginRequest, RegisterRequest,
    UpdateMpinRequest, VerifyUserRequest,
};
use crate::security_middleware::AuthenticatedUser;
use crate::services::WalletService;
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "wallet-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn register(
    accounts: web::Data<Arc<AccountService>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, WalletError> {
    let account = accounts.register(request.into_inner()).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "address": account.address
    })))
}

pub async fn login(
    accounts: web::Data<Arc<AccountService>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, WalletError> {
    let response = accounts.login(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn verify_user(
    user: AuthenticatedUser,
    accounts: web::Data<Arc<AccountService>>,
    request: web::Json<VerifyUserRequest>,
) -> Result<HttpResponse, WalletError> {
    let response = accounts
        .verify_user(&user.address, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn update_mpin(
    user: AuthenticatedUser,
    accounts: web::Data<Arc<AccountService>>,
    request: web::Json<UpdateMpinRequest>,
) -> Result<HttpResponse, WalletError> {
    accounts
        .update_mpin(&user.address, request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "MPIN updated successfully"
    })))
}

pub async fn get_balance(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, WalletError> {
    let response = service.get_balance(&user.address).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn deposit(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
    request: web::Json<DepositRequest>,
) -> Result<HttpResponse, WalletError> {
    let response = service.deposit(&user.address, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Transaction log of the caller, oldest first
pub async fn list_transactions(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, WalletError> {
    let entries = service.list_transactions(&user.address).await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn create_token(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
    request: web::Json<CreateTokenRequest>,
) -> Result<HttpResponse, WalletError> {
    let response = service
        .create_token(&user.address, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(response))
}

pub async fn claim_token(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
    request: web::Json<ClaimTokenRequest>,
) -> Result<HttpResponse, WalletError> {
    let response = service
        .claim_token(&user.address, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn get_token(
    user: AuthenticatedUser,
    service: web::Data<Arc<WalletService>>,
    token_id: web::Path<String>,
) -> Result<HttpResponse, WalletError> {
    let token = service.get_token(&user.address, &token_id).await?;
    Ok(HttpResponse::Ok().json(token))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Malformed or mistyped JSON bodies surface as validation errors.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    WalletError::Validation(format!("Invalid request body: {}", err)).into()
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(json_error)
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/verify-user", web::post().to(verify_user))
                    .route("/update-mpin", web::post().to(update_mpin)),
            )
            .service(
                web::scope("/wallet")
                    .route("/balance", web::get().to(get_balance))
                    .route("/deposit", web::post().to(deposit))
                    .route("/transactions", web::get().to(list_transactions)),
            )
            .service(
                web::scope("/tokens")
                    .route("", web::post().to(create_token))
                    .route("/claim", web::post().to(claim_token))
                    .route("/{token_id}", web::get().to(get_token)),
            ),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::memory::MemoryStore;
    use crate::security_middleware::{JwtAuth, JwtKeys};
    use crate::store::WalletStore;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;

    fn state() -> (Arc<WalletService>, Arc<AccountService>, Arc<JwtKeys>) {
        let store: Arc<dyn WalletStore> = Arc::new(MemoryStore::new());
        let keys = Arc::new(JwtKeys::new(b"0123456789abcdef0123456789abcdef", 3600));
        (
            Arc::new(WalletService::new(store.clone(), TransferConfig::default())),
            Arc::new(AccountService::new(store, keys.clone())),
            keys,
        )
    }

    macro_rules! app {
        ($wallet:expr, $accounts:expr, $keys:expr) => {
            test::init_service(
                App::new()
                    .wrap(JwtAuth::new($keys.clone()))
                    .app_data(json_config())
                    .app_data(web::Data::new($wallet.clone()))
                    .app_data(web::Data::new($accounts.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health_is_public() {
        let (wallet, accounts, keys) = state();
        let app = app!(wallet, accounts, keys);

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_protected_route_requires_token() {
        let (wallet, accounts, keys) = state();
        let app = app!(wallet, accounts, keys);

        let req = test::TestRequest::get()
            .uri("/api/v1/wallet/balance")
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/v1/wallet/balance")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_register_login_and_balance() {
        let (wallet, accounts, keys) = state();
        let app = app!(wallet, accounts, keys);

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(json!({
                "email": "asha@example.com",
                "name": "Asha",
                "mobileNo": "9876543210",
                "panCard": "ABCDE1234F",
                "password": "s3cret-pass",
                "mpin": "123456"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"mobileNo": "9876543210", "password": "s3cret-pass"}))
            .to_request();
        let session: Value = test::call_and_read_body_json(&app, req).await;
        let token = session["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/v1/wallet/balance")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["address"], "asha@example.com");
        assert_eq!(body["balance"], 0);
    }

    #[actix_web::test]
    async fn test_malformed_body_is_validation_error() {
        let (wallet, accounts, keys) = state();
        let token = keys.issue("asha@example.com").unwrap();
        let app = app!(wallet, accounts, keys);

        let req = test::TestRequest::post()
            .uri("/api/v1/wallet/deposit")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"amount\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_unknown_token_is_not_found() {
        let (wallet, accounts, keys) = state();
        let token = keys.issue("asha@example.com").unwrap();
        let app = app!(wallet, accounts, keys);

        let req = test::TestRequest::post()
            .uri("/api/v1/tokens/claim")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({"tokenId": format!("0x{}", "ab".repeat(32))}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
