use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{CONTRIBUTOR, CredentialField, Provider};
use crate::error::SnapshotError;
use crate::store::Credentials;

pub const DEFAULT_CONFIG_FILE: &str = "auth.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
    #[serde(default)]
    pub repository: Option<RepositoryEntry>,
    #[serde(default)]
    pub http: Option<HttpEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RepositoryEntry {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HttpEntry {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub root: Utf8PathBuf,
    pub credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub services: BTreeMap<String, ServiceEntry>,
    pub repository: RepositorySettings,
    pub http: HttpSettings,
}

impl ResolvedConfig {
    /// Looks up the credential a provider expects, by service name.
    pub fn credential(&self, provider: Provider) -> Result<&str, SnapshotError> {
        let field = provider.credential_field();
        let missing = || SnapshotError::MissingCredential {
            service: provider.service_name().to_string(),
            field: field.to_string(),
        };
        let entry = self.services.get(provider.service_name()).ok_or_else(missing)?;
        let value = match field {
            CredentialField::Key => entry.key.as_deref(),
            CredentialField::Token => entry.token.as_deref(),
        };
        value.filter(|value| !value.is_empty()).ok_or_else(missing)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SnapshotError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            return Err(SnapshotError::MissingConfig(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SnapshotError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SnapshotError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SnapshotError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let repository = config.repository.unwrap_or_default();
        let root = match repository.root {
            Some(root) => Utf8PathBuf::from(root),
            None => default_repository_root()?,
        };
        let credentials = Credentials {
            username: repository
                .username
                .unwrap_or_else(|| CONTRIBUTOR.to_string()),
            password: repository
                .password
                .unwrap_or_else(|| CONTRIBUTOR.to_string()),
        };

        let http = config.http.unwrap_or_default();
        let http = HttpSettings {
            timeout: http.timeout_secs.map(Duration::from_secs),
            user_agent: http.user_agent.unwrap_or_else(default_user_agent),
        };

        Ok(ResolvedConfig {
            schema_version,
            services: config.services,
            repository: RepositorySettings { root, credentials },
            http,
        })
    }
}

pub fn default_repository_root() -> Result<Utf8PathBuf, SnapshotError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("civic-snapshot").join("repo"))
                .ok()
        })
        .ok_or_else(|| SnapshotError::Filesystem("unable to resolve data directory".to_string()))
}

pub fn default_user_agent() -> String {
    format!("civic-snapshot/{}", env!("CARGO_PKG_VERSION"))
}
