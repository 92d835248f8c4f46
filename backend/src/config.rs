// src/config.rs

use std::env;

/// Passing threshold (percent) applied to quizzes created without one.
pub const DEFAULT_PASSING_SCORE: i32 = 70;

/// Attempt ceiling applied to quizzes created without one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Number of rows returned by a quiz leaderboard.
pub const LEADERBOARD_SIZE: i64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// `DATABASE_URL` and `JWT_SECRET` are required; everything else has a default.
    pub fn from_env() -> Result<Self, String> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86_400)?;
        let port = parse_or("PORT", 3000)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok().filter(|s| !s.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
            port,
            cors_origins,
        })
    }
}

fn required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{} must be set", key))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
