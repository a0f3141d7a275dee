pub mod auth;
pub mod metrics;
pub mod password;
pub mod tokens;
