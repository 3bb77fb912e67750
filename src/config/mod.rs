use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Development falls back to the in-memory store when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub require_https: bool,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub reset_code_minutes: i64,
    pub verify_token_hours: i64,
    pub resource_token_minutes: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host. Empty means mail is logged instead of sent.
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub use_starttls: bool,
    pub from: String,
    pub verification_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("API_BIND") {
            self.api.bind = v;
        }
        if let Ok(v) = env::var("API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_REQUIRE_HTTPS") {
            self.security.require_https = v.parse().unwrap_or(self.security.require_https);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_MINUTES") {
            self.security.access_token_minutes = v.parse().unwrap_or(self.security.access_token_minutes);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_DAYS") {
            self.security.refresh_token_days = v.parse().unwrap_or(self.security.refresh_token_days);
        }
        if let Ok(v) = env::var("SECURITY_RESET_CODE_MINUTES") {
            self.security.reset_code_minutes = v.parse().unwrap_or(self.security.reset_code_minutes);
        }
        if let Ok(v) = env::var("SECURITY_VERIFY_TOKEN_HOURS") {
            self.security.verify_token_hours = v.parse().unwrap_or(self.security.verify_token_hours);
        }
        if let Ok(v) = env::var("SECURITY_RESOURCE_TOKEN_MINUTES") {
            self.security.resource_token_minutes = v.parse().unwrap_or(self.security.resource_token_minutes);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }

        // Mail overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.mail.smtp_host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.mail.smtp_port = v.parse().unwrap_or(self.mail.smtp_port);
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.mail.smtp_username = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.mail.smtp_password = Some(v);
        }
        if let Ok(v) = env::var("SMTP_STARTTLS") {
            self.mail.use_starttls = v.parse().unwrap_or(self.mail.use_starttls);
        }
        if let Ok(v) = env::var("SMTP_FROM") {
            self.mail.from = v;
        }
        if let Ok(v) = env::var("MAIL_VERIFICATION_BASE_URL") {
            self.mail.verification_base_url = v;
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                bind: "127.0.0.1".to_string(),
                port: 8080,
                enable_request_logging: true,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                require_https: false,
                jwt_secret: "development-only-secret".to_string(),
                jwt_issuer: "family-benefits-api".to_string(),
                access_token_minutes: 60,
                refresh_token_days: 30,
                reset_code_minutes: 15,
                verify_token_hours: 48,
                resource_token_minutes: 10,
                bcrypt_cost: 4,
            },
            mail: MailConfig {
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                use_starttls: true,
                from: "Family Benefits <no-reply@localhost>".to_string(),
                verification_base_url: "http://localhost:5173/verify".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                bind: "0.0.0.0".to_string(),
                port: 8080,
                enable_request_logging: true,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                require_https: true,
                jwt_secret: String::new(),
                jwt_issuer: "family-benefits-api".to_string(),
                access_token_minutes: 30,
                refresh_token_days: 14,
                reset_code_minutes: 15,
                verify_token_hours: 24,
                resource_token_minutes: 10,
                bcrypt_cost: 10,
            },
            mail: MailConfig {
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                use_starttls: true,
                from: "Family Benefits <no-reply@staging.example.com>".to_string(),
                verification_base_url: "https://staging.example.com/verify".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                bind: "0.0.0.0".to_string(),
                port: 8080,
                enable_request_logging: false,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                require_https: true,
                jwt_secret: String::new(),
                jwt_issuer: "family-benefits-api".to_string(),
                access_token_minutes: 15,
                refresh_token_days: 14,
                reset_code_minutes: 10,
                verify_token_hours: 24,
                resource_token_minutes: 5,
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            mail: MailConfig {
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                use_starttls: true,
                from: "Family Benefits <no-reply@example.com>".to_string(),
                verification_base_url: "https://app.example.com/verify".to_string(),
            },
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
