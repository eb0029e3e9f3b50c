//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `RAPIDAPI_PROXY_SECRET` (optional): shared secret expected from the
///   RapidAPI proxy. Without it every proxy request is rejected.
/// - `USAGE_QUEUE_CAPACITY` (optional): pending usage events before new ones
///   are dropped, defaults to 1024
#[derive(Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default)]
    pub rapidapi_proxy_secret: Option<String>,

    #[serde(default = "default_usage_queue_capacity")]
    pub usage_queue_capacity: usize,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_usage_queue_capacity() -> usize {
    1024
}

// Hand-written so secrets never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"<redacted>")
            .field("server_port", &self.server_port)
            .field("database_max_connections", &self.database_max_connections)
            .field(
                "rapidapi_proxy_secret",
                &self.rapidapi_proxy_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("usage_queue_capacity", &self.usage_queue_capacity)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }
}
