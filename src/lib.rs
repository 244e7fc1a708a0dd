//! Asset Tracker
//!
//! A multi-tenant JSON:API engine over Neo4j:
//! - Declarative entity models in a two-phase registry
//! - Tenant-scoped Cypher builders and a generic repository
//! - JSON:API serialisation with cursor pagination, includes and sparse fieldsets
//! - Versioned Cypher migrations

pub mod api;
pub mod auth;
pub mod cypher;
pub mod entities;
pub mod error;
pub mod jsonapi;
pub mod migrations;
pub mod model;
pub mod neo4j;
pub mod repository;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub neo4j: Neo4jYamlConfig,
    pub storage: StorageYamlConfig,
    pub migrations: MigrationsYamlConfig,
    /// Auth section; if absent, auth_config will be None (deny-by-default)
    pub auth: Option<AuthConfig>,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    /// Base of the `links.self` URLs in documents
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Regex patterns of allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            api_base_url: "http://localhost:8080/api".into(),
            request_timeout_secs: 30,
            cors_origins: Vec::new(),
        }
    }
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub query_timeout_secs: u64,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            query_timeout_secs: 15,
        }
    }
}

/// Object storage section (signed URLs for avatars, logos, invoices)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageYamlConfig {
    pub public_url: String,
    pub signing_secret: String,
    pub url_ttl_secs: i64,
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:9000/assets".into(),
            signing_secret: String::new(),
            url_ttl_secs: 900,
        }
    }
}

/// Migrations section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationsYamlConfig {
    pub path: String,
    pub run_on_startup: bool,
}

impl Default for MigrationsYamlConfig {
    fn default() -> Self {
        Self {
            path: "migrations".into(),
            run_on_startup: true,
        }
    }
}

/// Auth configuration. Tokens are issued elsewhere; this service only
/// verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub query_timeout: Duration,
    pub server_port: u16,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub cors_origins: Vec<String>,
    pub storage_public_url: String,
    pub storage_signing_secret: String,
    pub storage_url_ttl_secs: i64,
    pub migrations_path: PathBuf,
    pub run_migrations_on_startup: bool,
    /// Auth config; None means deny-by-default (no auth section in YAML)
    pub auth_config: Option<AuthConfig>,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        // 1. Load YAML config (or defaults if file not found)
        let yaml = Self::load_yaml(yaml_path);

        // 2. Build Config with env var overrides
        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            query_timeout: Duration::from_secs(yaml.neo4j.query_timeout_secs),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(yaml.server.api_base_url),
            request_timeout: Duration::from_secs(yaml.server.request_timeout_secs),
            cors_origins: yaml.server.cors_origins,
            storage_public_url: std::env::var("STORAGE_PUBLIC_URL")
                .unwrap_or(yaml.storage.public_url),
            storage_signing_secret: std::env::var("STORAGE_SIGNING_SECRET")
                .unwrap_or(yaml.storage.signing_secret),
            storage_url_ttl_secs: yaml.storage.url_ttl_secs,
            migrations_path: std::env::var("MIGRATIONS_PATH")
                .unwrap_or(yaml.migrations.path)
                .into(),
            run_migrations_on_startup: yaml.migrations.run_on_startup,
            auth_config: yaml.auth,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Boot
// ============================================================================

/// Phase one of boot: register the catalogue, then freeze it
pub fn build_registry(signer: Arc<dyn storage::UrlSigner>) -> Result<model::ModelRegistry> {
    let mut builder = model::ModelRegistryBuilder::new();
    entities::register_all(&mut builder, signer).context("Failed to register entity models")?;
    let registry = builder.freeze();
    tracing::info!("Registered {} entity models", registry.len());
    Ok(registry)
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn neo4j::QueryExecutor>,
    pub registry: Arc<model::ModelRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the registry and connect to Neo4j
    pub async fn new(config: Config) -> Result<Self> {
        let signer = Arc::new(storage::HmacUrlSigner::new(
            &config.storage_public_url,
            &config.storage_signing_secret,
            config.storage_url_ttl_secs,
        ));
        let registry = Arc::new(build_registry(signer)?);

        let executor = Arc::new(
            neo4j::Neo4jService::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
                config.query_timeout,
            )
            .await?,
        );

        Ok(Self {
            executor,
            registry,
            config: Arc::new(config),
        })
    }

    /// Apply pending migrations from `dir`
    pub async fn run_migrations(&self, dir: &Path) -> Result<Vec<migrations::MigrationId>> {
        let applied = migrations::MigrationRunner::new(self.executor.clone())
            .run_dir(dir)
            .await?;
        Ok(applied)
    }
}

/// Boot the HTTP server: connect, migrate, reconcile the schema, serve
pub async fn start_server(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;

    if state.config.run_migrations_on_startup {
        state.run_migrations(&state.config.migrations_path).await?;
    }
    repository::bootstrap_schema(state.executor.as_ref(), &state.registry).await?;

    let server_state = Arc::new(api::handlers::ServerState {
        service: service::ResourceService::new(
            state.registry.clone(),
            state.executor.clone(),
            &state.config.api_base_url,
        ),
        executor: state.executor.clone(),
        auth_config: state.config.auth_config.clone(),
        request_timeout: state.config.request_timeout,
        cors_origins: state.config.cors_origins.clone(),
    });
    if server_state.auth_config.is_none() {
        tracing::warn!("No auth section configured, every API request will be refused");
    }

    let app = api::create_router(server_state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090
  api_base_url: https://api.example.com/v1
  cors_origins:
    - https://app\.example\.com

neo4j:
  uri: bolt://db:7687
  user: admin
  password: secret
  query_timeout_secs: 5

storage:
  public_url: https://files.example.com
  signing_secret: s3cret

migrations:
  path: /srv/migrations
  run_on_startup: false

auth:
  jwt_secret: "super-secret-key-min-32-characters!"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.api_base_url, "https://api.example.com/v1");
        assert_eq!(config.server.cors_origins, [r"https://app\.example\.com"]);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.neo4j.uri, "bolt://db:7687");
        assert_eq!(config.neo4j.query_timeout_secs, 5);
        assert_eq!(config.storage.signing_secret, "s3cret");
        assert_eq!(config.storage.url_ttl_secs, 900);
        assert_eq!(config.migrations.path, "/srv/migrations");
        assert!(!config.migrations.run_on_startup);
        assert_eq!(
            config.auth.unwrap().jwt_secret,
            "super-secret-key-min-32-characters!"
        );
    }

    #[test]
    fn test_auth_config_absent() {
        let yaml = r#"
server:
  port: 8080
neo4j:
  uri: bolt://localhost:7687
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.server.cors_origins.is_empty());
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert_eq!(config.neo4j.query_timeout_secs, 15);
        assert_eq!(config.migrations.path, "migrations");
        assert!(config.migrations.run_on_startup);
        assert!(config.auth.is_none());
    }

    /// Combined test for YAML file loading and env var overrides.
    /// Runs as a single test to avoid parallel env var race conditions.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        // Helper to clear all config env vars
        fn clear_env() {
            for var in &[
                "NEO4J_URI",
                "NEO4J_USER",
                "NEO4J_PASSWORD",
                "SERVER_PORT",
                "API_BASE_URL",
                "MIGRATIONS_PATH",
                "STORAGE_PUBLIC_URL",
                "STORAGE_SIGNING_SECRET",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
  request_timeout_secs: 12
neo4j:
  uri: bolt://yaml-host:7687
  user: yaml-user
  password: yaml-pass
migrations:
  path: yaml-migrations
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.neo4j_uri, "bolt://yaml-host:7687");
        assert_eq!(config.neo4j_user, "yaml-user");
        assert_eq!(config.migrations_path, PathBuf::from("yaml-migrations"));
        assert!(config.auth_config.is_none());

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("NEO4J_URI", "bolt://env-host:7687");
        std::env::set_var("SERVER_PORT", "7777");
        std::env::set_var("MIGRATIONS_PATH", "env-migrations");
        std::env::set_var("STORAGE_SIGNING_SECRET", "env-secret");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.neo4j_uri, "bolt://env-host:7687");
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.migrations_path, PathBuf::from("env-migrations"));
        assert_eq!(config.storage_signing_secret, "env-secret");
        // YAML value still used where no env override
        assert_eq!(config.neo4j_user, "yaml-user");

        clear_env();

        // --- Phase 3: No YAML file → defaults ---
        let nonexistent = Path::new("/tmp/nonexistent-config-12345.yaml");
        let config = Config::from_yaml_and_env(Some(nonexistent)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.neo4j_uri, "bolt://localhost:7687");
        assert_eq!(config.query_timeout, Duration::from_secs(15));
        assert!(config.auth_config.is_none());

        // --- Phase 4: Unparsable YAML → defaults ---
        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "server: [not, a, map").unwrap();
        let config = Config::from_yaml_and_env(Some(&broken)).unwrap();
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn test_build_registry_freezes_the_catalogue() {
        let signer = Arc::new(storage::HmacUrlSigner::new("https://files.test", "k", 60));
        let registry = build_registry(signer).unwrap();
        assert!(registry.by_endpoint("equipment").is_some());
        assert!(registry.by_endpoint("loans").is_some());
    }
}
