mod auth;
mod error_handler;
mod rate_limit;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use rate_limit::{
    KeyFn, RateLimitPolicy, RateLimitTier, client_ip, rate_limit, user_and_ip, user_only,
};
