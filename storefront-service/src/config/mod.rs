use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub common: core_config::Config,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
    pub catalog: CatalogConfig,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MongoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: Secret<String>,
    pub mongodb_database: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub enum CatalogConfig {
    Http { base_url: String, timeout: Duration },
    Static { seed_path: Option<PathBuf> },
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::MongoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_BACKEND must be 'mongodb' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

impl StorefrontConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("mongodb"), false)?.parse()?;
        if is_prod && backend == StoreBackend::Memory {
            tracing::warn!("STORE_BACKEND=memory in production: carts and orders will not survive a restart");
        }

        let store = StoreConfig {
            backend,
            mongodb_uri: Secret::new(get_env(
                "MONGODB_URI",
                Some("mongodb://localhost:27017"),
                is_prod && backend == StoreBackend::MongoDb,
            )?),
            mongodb_database: get_env("MONGODB_DATABASE", Some("storefront_db"), false)?,
        };

        let jwt = JwtConfig {
            secret: Secret::new(get_env("JWT_SECRET", Some("dev-only-secret"), is_prod)?),
            expiry_hours: get_env("JWT_EXPIRY_HOURS", Some("40"), false)?
                .parse()
                .unwrap_or(40),
        };

        let catalog = match get_env("CATALOG_BACKEND", Some("http"), false)?.as_str() {
            "static" => CatalogConfig::Static {
                seed_path: env::var("CATALOG_SEED_PATH").ok().map(PathBuf::from),
            },
            "http" => CatalogConfig::Http {
                base_url: get_env("CATALOG_BASE_URL", Some("http://localhost:3000"), is_prod)?,
                timeout: Duration::from_secs(
                    get_env("CATALOG_TIMEOUT_SECS", Some("5"), false)?
                        .parse()
                        .unwrap_or(5),
                ),
            },
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "CATALOG_BACKEND must be 'http' or 'static', got '{}'",
                    other
                )))
            }
        };

        let allowed_origins = get_env("CORS_ALLOWED_ORIGINS", Some("http://localhost:5173"), false)?
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(StorefrontConfig {
            common,
            store,
            jwt,
            catalog,
            allowed_origins,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
