use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;

/// Runtime settings, read from the environment (and an optional `.env`).
/// Keys are the lowercased variable names, e.g. `JWT_SECRET` -> `jwt_secret`.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Postgres URL. Without it the server keeps everything in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    /// Prefix for URLs handed out for uploaded files.
    pub public_base_url: String,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub reservation_validity_days: i64,
    pub sweep_interval_secs: u64,
    pub strict_transitions: bool,
    pub allow_dev_login: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Self::from_builder(Config::builder().add_source(Environment::default().try_parsing(true)))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder
            .set_default("port", 8080)?
            .set_default("public_base_url", "http://localhost:8080")?
            .set_default("upload_dir", "uploads")?
            .set_default("max_upload_bytes", 5 * 1024 * 1024)?
            .set_default("reservation_validity_days", 7)?
            .set_default("sweep_interval_secs", 300)?
            .set_default("strict_transitions", false)?
            .set_default("allow_dev_login", false)?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("jwt_secret must not be empty".into()));
        }
        if self.public_base_url.trim().is_empty() {
            return Err(ConfigError::Message("public_base_url must not be empty".into()));
        }
        if self.reservation_validity_days < 1 {
            return Err(ConfigError::Message(
                "reservation_validity_days must be at least 1".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Message("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
