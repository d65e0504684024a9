use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Tunables for duplicate detection, alias matching and parsing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Date window (days, each side) for near-duplicate suggestions.
    pub duplicate_window_days: i64,
    /// Minimum fuzzy similarity score accepted as an alias suggestion.
    pub min_fuzzy_confidence: u8,
    /// Tax rate (percent) applied when a line item declares none.
    pub default_tax_rate: BigDecimal,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppConfig {
    /// Loads configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/invoice_intake".to_string()),
            },
            matching: MatchingConfig {
                duplicate_window_days: std::env::var("DUPLICATE_WINDOW_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                min_fuzzy_confidence: std::env::var("MIN_FUZZY_CONFIDENCE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(70),
                default_tax_rate: std::env::var("DEFAULT_TAX_RATE_PERCENT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| BigDecimal::from(20)),
            },
        }
    }
}
