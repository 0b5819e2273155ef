pub mod auth;
pub mod jwt;
pub mod password;

pub use auth::{AuthenticatedUser, JwtAuth};
pub use jwt::{Claims, JwtKeys};
