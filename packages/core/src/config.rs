use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub auth_secret: String,
    pub token_ttl_seconds: i64,
    pub report_webhook_url: Option<String>,
    pub report_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| "PORT must be a valid port number")?,
            Err(_) => 4000,
        };

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:library.db".to_string());

        let auth_secret = env::var("AUTH_SECRET").map_err(|_| "AUTH_SECRET is required")?;
        if auth_secret.len() < 16 {
            return Err("AUTH_SECRET must be at least 16 characters".to_string());
        }

        let token_ttl_seconds = match env::var("TOKEN_TTL_SECONDS") {
            Ok(raw) => raw
                .parse::<i64>()
                .map_err(|_| "TOKEN_TTL_SECONDS must be a valid number")?,
            Err(_) => 86_400,
        };
        if token_ttl_seconds <= 0 {
            return Err("TOKEN_TTL_SECONDS must be positive".to_string());
        }

        let report_webhook_url = env::var("REPORT_WEBHOOK_URL").ok();

        let report_interval_seconds = match env::var("REPORT_INTERVAL_SECONDS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| "REPORT_INTERVAL_SECONDS must be a valid number")?,
            Err(_) => 3_600,
        };

        Ok(Self {
            port,
            database_url,
            auth_secret,
            token_ttl_seconds,
            report_webhook_url,
            report_interval_seconds,
        })
    }
}
