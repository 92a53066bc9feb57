use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEV_JWT_SECRET: &str = "annotater-development-secret-change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Absent means in-memory repositories
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub min_password_length: usize,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub document_path: PathBuf,
    pub document_ext: String,
    pub report_path: PathBuf,
    pub report_ext: String,
    pub max_document_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Unknown detector tags fail the report instead of being dropped
    pub strict_types: bool,
    /// Serialize report generation per document
    pub serialize_per_document: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connection_timeout: 30,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiry_hours: 24 * 7, // 1 week
            min_password_length: 8,
            bootstrap_admin: None,
            enable_cors: true,
            cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/pipeline".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("data/documents"),
            document_ext: ".pdf".to_string(),
            report_path: PathBuf::from("data/reports"),
            report_ext: ".json".to_string(),
            max_document_bytes: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strict_types: false,
            serialize_per_document: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Environment preset (or YAML file), then environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?.with_env_overrides(),
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

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

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("SERVER_ADDR") {
            self.server.addr = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_MIN_PASSWORD_LENGTH") {
            self.security.min_password_length = v.parse().unwrap_or(self.security.min_password_length);
        }
        if let (Ok(handle), Ok(password)) = (env::var("ADMIN_HANDLE"), env::var("ADMIN_PASSWORD")) {
            self.security.bootstrap_admin = Some(BootstrapAdmin { handle, password });
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Model overrides
        if let Ok(v) = env::var("MODEL_URL") {
            self.model.url = v;
        }
        if let Ok(v) = env::var("MODEL_TIMEOUT_SECS") {
            self.model.timeout_secs = v.parse().unwrap_or(self.model.timeout_secs);
        }

        // Storage overrides
        if let Ok(v) = env::var("DOCUMENT_PATH") {
            self.storage.document_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("REPORT_PATH") {
            self.storage.report_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("STORAGE_MAX_DOCUMENT_BYTES") {
            self.storage.max_document_bytes = v.parse().unwrap_or(self.storage.max_document_bytes);
        }

        // Pipeline overrides
        if let Ok(v) = env::var("PIPELINE_STRICT_TYPES") {
            self.pipeline.strict_types = v.parse().unwrap_or(self.pipeline.strict_types);
        }
        if let Ok(v) = env::var("PIPELINE_SERIALIZE_PER_DOCUMENT") {
            self.pipeline.serialize_per_document =
                v.parse().unwrap_or(self.pipeline.serialize_per_document);
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("JWT secret must not be empty".to_string()));
        }
        if self.environment != Environment::Development && self.security.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::Invalid(
                "JWT_SECRET must be set outside development".to_string(),
            ));
        }
        if self.security.jwt_expiry_hours == 0 {
            return Err(ConfigError::Invalid("jwt_expiry_hours must be positive".to_string()));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid("model timeout must be positive".to_string()));
        }
        url::Url::parse(&self.model.url)
            .map_err(|e| ConfigError::Invalid(format!("model url '{}': {}", self.model.url, e)))?;
        Ok(())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            model: ModelConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
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
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                min_password_length: 10,
                bootstrap_admin: None,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            ..Self::development()
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
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                min_password_length: 12,
                bootstrap_admin: None,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            model: ModelConfig {
                timeout_secs: 30,
                ..ModelConfig::default()
            },
            storage: StorageConfig {
                max_document_bytes: 20 * 1024 * 1024, // 20MB
                ..StorageConfig::default()
            },
            ..Self::development()
        }
    }
}
