use crate::errors::WalletError;
use crate::security_middleware::jwt::JwtKeys;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

/// Paths reachable without a session token
pub const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/metrics",
    "/api/v1/health",
    "/api/v1/auth/register",
    "/api/v1/auth/login",
];

/// The caller identity established by [`JwtAuth`]. Handlers take the address
/// from here and never from the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub address: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| WalletError::Unauthorized.into()),
        )
    }
}

pub struct JwtAuth {
    keys: Arc<JwtKeys>,
}

impl JwtAuth {
    pub fn new(keys: Arc<JwtKeys>) -> Self {
        Self { keys }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            keys: self.keys.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    keys: Arc<JwtKeys>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if PUBLIC_PATHS.contains(&req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        // Extract token from Authorization header
        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
        {
            Some(auth_str) => match auth_str.strip_prefix("Bearer ") {
                Some(token) => token.trim().to_string(),
                None => return reject(),
            },
            None => return reject(),
        };

        match self.keys.verify(&token) {
            Ok(claims) => {
                req.extensions_mut().insert(AuthenticatedUser {
                    address: claims.sub,
                });

                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(err) => {
                tracing::warn!(path = %req.path(), "JWT validation failed: {}", err);
                reject()
            }
        }
    }
}

fn reject<B: 'static>() -> LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>> {
    let rejected: Ready<Result<ServiceResponse<B>, Error>> =
        ready(Err(WalletError::Unauthorized.into()));
    Box::pin(rejected)
}
