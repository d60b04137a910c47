use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_secs: default_acquire_timeout(),
            sqlx_logging: false,
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 3600 }
fn default_acquire_timeout() -> u64 { 30 }

/// Which store holds the authoritative book rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Postgres,
    Memory,
}

/// How blob object keys are derived from a book.
///
/// `Id` gives `book_<id>.json` and never changes for a record. `Title` gives
/// `<title>.json`, so renaming a book moves its blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    #[default]
    Id,
    Title,
}

impl std::str::FromStr for KeyScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(KeyScheme::Id),
            "title" => Ok(KeyScheme::Title),
            other => Err(anyhow!("unknown blob key scheme: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub index_backend: IndexBackend,
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,
    #[serde(default)]
    pub key_scheme: KeyScheme,
    /// Seed dataset override; the bundled dataset is used when unset.
    #[serde(default)]
    pub seed_path: Option<String>,
    /// Serialize id allocation inside this process.
    #[serde(default)]
    pub serialize_creates: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_backend: IndexBackend::default(),
            blob_dir: default_blob_dir(),
            key_scheme: KeyScheme::default(),
            seed_path: None,
            serialize_creates: false,
        }
    }
}

fn default_blob_dir() -> String { "data/my-books".to_string() }

pub fn default_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&default_path())
}

/// True when `err` comes from the config file not existing, as opposed to
/// the file being unreadable or invalid.
pub fn is_missing_file(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        Self::load_and_validate_from(&default_path())
    }

    pub fn load_and_validate_from(path: &str) -> Result<Self> {
        let mut cfg = load_from_file(path)?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Build a configuration purely from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();
        if let Some(host) = lookup("SERVER_HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            cfg.server.port = port;
        }
        if let Some(w) = lookup("TOKIO_WORKER_THREADS").and_then(|v| v.parse::<usize>().ok()) {
            cfg.server.worker_threads = Some(w);
        }
        match lookup("DATABASE_URL") {
            Some(url) if !url.trim().is_empty() => {
                cfg.database.url = url;
                cfg.catalog.index_backend = IndexBackend::Postgres;
            }
            _ => cfg.catalog.index_backend = IndexBackend::Memory,
        }
        if let Some(dir) = lookup("BLOB_DIR") {
            cfg.catalog.blob_dir = dir;
        }
        if let Some(scheme) = lookup("BLOB_KEY_SCHEME") {
            cfg.catalog.key_scheme = scheme.parse()?;
        }
        cfg.catalog.seed_path = lookup("SEED_PATH").filter(|p| !p.trim().is_empty());
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // 归一化 server
        self.server.normalize()?;
        // 仅 postgres 后端需要数据库 URL
        if self.catalog.index_backend == IndexBackend::Postgres {
            self.database.normalize_from_env();
            self.database.validate()?;
        }
        self.catalog.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        // 若 TOML 中未提供 URL，则尝试从环境变量填充
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("database.url is empty; set it in config.toml or DATABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://")) {
            return Err(anyhow!("database.url must start with postgresql:// or postgres://"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blob_dir.trim().is_empty() {
            return Err(anyhow!("catalog.blob_dir must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_full_file() {
        let cfg = load_from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [database]
            url = "postgres://u:p@localhost:5432/books"

            [catalog]
            index_backend = "postgres"
            blob_dir = "/var/lib/books"
            key_scheme = "title"
            serialize_creates = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.catalog.key_scheme, KeyScheme::Title);
        assert_eq!(cfg.catalog.index_backend, IndexBackend::Postgres);
        assert!(cfg.catalog.serialize_creates);
        assert!(cfg.catalog.seed_path.is_none());
    }

    #[test]
    fn catalog_defaults_when_section_missing() {
        let cfg = load_from_str("[server]\nhost = \"127.0.0.1\"\nport = 8080\n").unwrap();
        assert_eq!(cfg.catalog.key_scheme, KeyScheme::Id);
        assert_eq!(cfg.catalog.blob_dir, "data/my-books");
        assert!(!cfg.catalog.serialize_creates);
    }

    #[test]
    fn memory_backend_skips_database_validation() {
        let mut cfg = load_from_str("[catalog]\nindex_backend = \"memory\"\n").unwrap();
        assert!(cfg.normalize_and_validate().is_ok());
    }

    #[test]
    fn postgres_backend_rejects_non_postgres_url() {
        let mut cfg = load_from_str("[database]\nurl = \"mysql://localhost/db\"\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn env_lookup_without_database_url_uses_memory_backend() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "8181"),
            ("BLOB_DIR", "/tmp/blobs"),
            ("BLOB_KEY_SCHEME", "Title"),
        ]);
        let cfg = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.server.port, 8181);
        assert_eq!(cfg.catalog.index_backend, IndexBackend::Memory);
        assert_eq!(cfg.catalog.blob_dir, "/tmp/blobs");
        assert_eq!(cfg.catalog.key_scheme, KeyScheme::Title);
    }

    #[test]
    fn env_lookup_rejects_unknown_key_scheme() {
        let res = AppConfig::from_lookup(|k| (k == "BLOB_KEY_SCHEME").then(|| "hash".to_string()));
        assert!(res.is_err());
    }

    #[test]
    fn missing_file_is_distinguished_from_bad_file() {
        let missing = AppConfig::load_and_validate_from("/no/such/config.toml").unwrap_err();
        assert!(is_missing_file(&missing));

        let bad = load_from_str("[server\nport = 1").unwrap_err();
        assert!(!is_missing_file(&bad));
        let mut zero_port = load_from_str("[server]\nhost = \"h\"\nport = 0\n[catalog]\nindex_backend = \"memory\"\n").unwrap();
        assert!(!is_missing_file(&zero_port.normalize_and_validate().unwrap_err()));
    }
}
