//! Crate configuration.
//!
//! The only knob this layer owns is where the remote task store lives.
//! Environment variables provide the defaults, matching how deployments
//! point the front end at a backend.

/// Configuration for reaching the remote task store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the task store API, without a trailing slash.
    pub base_url: String,
}

impl Config {
    /// Build configuration from the environment.
    ///
    /// - `ZYGONIC_API_URL` - base URL of the task store
    ///   (default `http://localhost:8000`)
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ZYGONIC_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}
