//! Authentication: token service, password hashing, and the request
//! middleware that attaches the caller's identity and tenant.

pub mod middleware;
pub mod models;
pub mod passwords;
pub mod tokens;

pub use models::{AuthContext, MaybeAuth};
pub use tokens::{TokenService, TokenVerification};
