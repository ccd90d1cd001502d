use anyhow::{bail, Context, Result};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_PORT: &str = "3000";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageBackend,
    /// Required for the Postgres backend only.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: String,
    pub seed_demo_data: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = match get("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => bail!("STORAGE_BACKEND must be postgres or memory, got {other:?}"),
        };

        let database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL missing");
        }

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {raw:?}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| {
            let port = get("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
            format!("0.0.0.0:{}", port)
        });

        let seed_demo_data = get("SEED_DEMO_DATA")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            storage,
            database_url,
            max_connections,
            bind_addr,
            seed_demo_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn postgres_needs_database_url() {
        assert!(load(&[]).is_err());
        let config = load(&[("DATABASE_URL", "postgres://localhost/feedback")]).unwrap();
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn memory_backend_with_overrides() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("PORT", "8080"),
            ("SEED_DEMO_DATA", "true"),
        ])
        .unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.seed_demo_data);

        let config = load(&[("STORAGE_BACKEND", "memory"), ("BIND_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("STORAGE_BACKEND", "mongo")]).is_err());
        assert!(load(&[
            ("STORAGE_BACKEND", "memory"),
            ("DATABASE_MAX_CONNECTIONS", "lots")
        ])
        .is_err());
    }
}
