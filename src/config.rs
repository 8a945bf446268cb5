// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use dotenvy::dotenv;

/// Maximum number of attachment files accepted on a single post.
pub const MAX_ATTACHMENTS: usize = 5;

/// Request body ceiling for the multipart post routes.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Sponsorship duration in days when none is given.
pub const DEFAULT_SPONSOR_DAYS: i32 = 3;

/// Upper bound for any single money amount: prices, sponsor totals, payouts.
pub const MAX_MONEY_AMOUNT: i64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the service on the in-process store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub listen_addr: SocketAddr,
    /// Directory where uploaded media lands.
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let listen_addr = env::var("LISTEN_ADDR")
            .ok()
            .and_then(|addr| addr.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("public/uploads"));

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        Self {
            database_url,
            jwt_secret,
            rust_log,
            listen_addr,
            upload_dir,
            log_dir,
        }
    }
}
