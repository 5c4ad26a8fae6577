//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// JWT secrets copied from sample files. The server refuses to start with them.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret_here",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `FETE_HOST`, `FETE_PORT`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Env: `FETE_DB_PATH`
    /// Default: `fete.db`
    pub db_path: PathBuf,

    /// HS256 signing key for bearer tokens.
    /// Env: `FETE_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// Env: `STRIPE_SECRET_KEY`
    /// Default: unset (payment calls answer 502).
    pub stripe_secret_key: Option<String>,

    /// Env: `STRIPE_WEBHOOK_SECRET`
    /// Default: unset (webhooks are refused).
    pub stripe_webhook_secret: Option<String>,

    /// Allowed CORS origin of the web client.
    /// Env: `FETE_CLIENT_URL`
    /// Default: unset (any origin).
    pub client_url: Option<String>,

    /// Chats idle longer than this many days are deleted (0 = keep forever).
    /// Env: `FETE_CHAT_RETENTION_DAYS`
    /// Default: `0`
    pub chat_retention_days: u32,

    /// Admin account created or promoted at startup.
    /// Env: `FETE_BOOTSTRAP_ADMIN_EMAIL`, `FETE_BOOTSTRAP_ADMIN_PASSWORD`
    pub bootstrap_admin: Option<AdminSeed>,
}

#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed").field("email", &self.email).finish_non_exhaustive()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 5000).into(),
            db_path: PathBuf::from("fete.db"),
            jwt_secret: String::new(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            client_url: None,
            chat_retention_days: 0,
            bootstrap_admin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = non_empty("FETE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = non_empty("FETE_PORT").unwrap_or_else(|| "5000".into());
        match format!("{host}:{port}").parse::<SocketAddr>() {
            Ok(addr) => config.http_addr = addr,
            Err(_) => tracing::warn!(%host, %port, "Invalid FETE_HOST/FETE_PORT, using default"),
        }

        if let Some(path) = non_empty("FETE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        config.jwt_secret = lookup("FETE_JWT_SECRET").unwrap_or_default();
        config.stripe_secret_key = non_empty("STRIPE_SECRET_KEY");
        config.stripe_webhook_secret = non_empty("STRIPE_WEBHOOK_SECRET");
        config.client_url = non_empty("FETE_CLIENT_URL");

        if let Some(val) = non_empty("FETE_CHAT_RETENTION_DAYS") {
            match val.parse::<u32>() {
                Ok(days) => config.chat_retention_days = days,
                Err(_) => tracing::warn!(value = %val, "Invalid FETE_CHAT_RETENTION_DAYS, keeping chats"),
            }
        }

        if let (Some(email), Some(password)) =
            (non_empty("FETE_BOOTSTRAP_ADMIN_EMAIL"), lookup("FETE_BOOTSTRAP_ADMIN_PASSWORD"))
        {
            config.bootstrap_admin = Some(AdminSeed { email, password });
        }

        config
    }

    /// Reject an unset or sample JWT secret.
    pub fn check_jwt_secret(&self) -> Result<(), String> {
        if self.jwt_secret.trim().is_empty() {
            return Err("FETE_JWT_SECRET is unset".into());
        }
        if PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str()) {
            return Err("FETE_JWT_SECRET is still a placeholder".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.db_path, PathBuf::from("fete.db"));
        assert_eq!(config.chat_retention_days, 0);
        assert!(config.stripe_webhook_secret.is_none());
        assert!(config.check_jwt_secret().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FETE_HOST", "127.0.0.1"),
            ("FETE_PORT", "8081"),
            ("FETE_JWT_SECRET", "s3cr3t-value"),
            ("FETE_CLIENT_URL", "http://localhost:3000"),
            ("FETE_CHAT_RETENTION_DAYS", "30"),
            ("STRIPE_WEBHOOK_SECRET", " "),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8081).into());
        assert_eq!(config.client_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.chat_retention_days, 30);
        assert!(config.stripe_webhook_secret.is_none());
        assert!(config.check_jwt_secret().is_ok());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[("FETE_PORT", "http"), ("FETE_CHAT_RETENTION_DAYS", "-1")]);
        assert_eq!(config.http_addr.port(), 5000);
        assert_eq!(config.chat_retention_days, 0);
    }

    #[test]
    fn test_placeholder_secret_refused() {
        let config = config(&[("FETE_JWT_SECRET", "dev-secret-change-me")]);
        assert!(config.check_jwt_secret().is_err());
    }

    #[test]
    fn test_admin_seed_needs_both_values() {
        assert!(config(&[("FETE_BOOTSTRAP_ADMIN_EMAIL", "ops@fete.test")]).bootstrap_admin.is_none());
        let seeded = config(&[
            ("FETE_BOOTSTRAP_ADMIN_EMAIL", "ops@fete.test"),
            ("FETE_BOOTSTRAP_ADMIN_PASSWORD", "hunter22"),
        ]);
        assert_eq!(seeded.bootstrap_admin.unwrap().email, "ops@fete.test");
    }
}
