//! # Operator Configuration
//!
//! Configuration loaded from environment variables. Every setting has a
//! default and can be overridden through the deployment's environment.

mod operator;
mod server;

pub use operator::OperatorConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (OperatorConfig, ServerConfig) {
    (OperatorConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
