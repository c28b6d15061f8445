use std::error::Error;
use std::fmt;

/// Unified application error.
///
/// Startup failures and outbound report delivery funnel through this
/// type so `main` and the scheduler fail in a predictable way. Loan and
/// store errors have their own richer types under `loans`.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Database(String),
    Network(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl Error for AppError {}
