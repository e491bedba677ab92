use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::Builder;

use crate::domain::CollectionName;
use crate::error::SnapshotError;

const ACCOUNTS_FILE: &str = "accounts.json";
const COLLECTIONS_DIR: &str = "collections";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Directory-backed document repository.
///
/// Layout:
/// - `accounts.json`: username to password map
/// - `collections/<namespace>.<name>.json`: JSON array of documents
#[derive(Debug, Clone)]
pub struct Repository {
    root: Utf8PathBuf,
}

impl Repository {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Creates the repository layout and registers (or updates) an account.
    pub fn init(&self, credentials: &Credentials) -> Result<(), SnapshotError> {
        fs::create_dir_all(self.collections_dir().as_std_path())
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        let mut accounts = if self.accounts_path().as_std_path().exists() {
            self.read_accounts()?
        } else {
            BTreeMap::new()
        };
        accounts.insert(credentials.username.clone(), credentials.password.clone());
        let content = serde_json::to_vec_pretty(&accounts)
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.accounts_path(), &content)
    }

    pub fn connect(&self, credentials: &Credentials) -> Result<Session, SnapshotError> {
        if !self.root.as_std_path().is_dir() {
            return Err(SnapshotError::StoreUnreachable(format!(
                "{} is not a repository directory",
                self.root
            )));
        }
        let accounts = self.read_accounts()?;
        match accounts.get(&credentials.username) {
            Some(password) if *password == credentials.password => {}
            _ => {
                return Err(SnapshotError::AuthenticationFailed(
                    credentials.username.clone(),
                ));
            }
        }
        tracing::debug!(
            user = %credentials.username,
            root = %self.root,
            "repository session opened"
        );
        Ok(Session {
            collections_dir: self.collections_dir(),
            username: credentials.username.clone(),
        })
    }

    fn accounts_path(&self) -> Utf8PathBuf {
        self.root.join(ACCOUNTS_FILE)
    }

    fn collections_dir(&self) -> Utf8PathBuf {
        self.root.join(COLLECTIONS_DIR)
    }

    fn read_accounts(&self) -> Result<BTreeMap<String, String>, SnapshotError> {
        let path = self.accounts_path();
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| SnapshotError::StoreUnreachable(format!("{path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| SnapshotError::StoreCorrupt {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

/// Authenticated handle to a [`Repository`]. Not shared; close it with
/// [`Session::logout`].
#[derive(Debug)]
pub struct Session {
    collections_dir: Utf8PathBuf,
    username: String,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn collection_path(&self, name: &CollectionName) -> Utf8PathBuf {
        self.collections_dir.join(format!("{name}.json"))
    }

    pub fn collection_exists(&self, name: &CollectionName) -> bool {
        self.collection_path(name).as_std_path().is_file()
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionName>, SnapshotError> {
        if !self.collections_dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.collections_dir.as_std_path())
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(name) = stem.parse::<CollectionName>() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn find(&self, name: &CollectionName) -> Result<Vec<Value>, SnapshotError> {
        let path = self.collection_path(name);
        if !path.as_std_path().is_file() {
            return Err(SnapshotError::CollectionNotFound(name.to_string()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| SnapshotError::StoreCorrupt {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    /// Removes a collection. Returns `false` when there was nothing to drop.
    pub fn drop_collection(&self, name: &CollectionName) -> Result<bool, SnapshotError> {
        self.ensure_writable(name)?;
        let path = self.collection_path(name);
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_file(path.as_std_path())
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        Ok(true)
    }

    pub fn create_collection(&self, name: &CollectionName) -> Result<(), SnapshotError> {
        self.ensure_writable(name)?;
        if self.collection_exists(name) {
            return Err(SnapshotError::CollectionExists(name.to_string()));
        }
        self.write_documents(name, &[])
    }

    /// Appends documents to an existing collection and returns how many were added.
    pub fn insert_many(
        &self,
        name: &CollectionName,
        documents: Vec<Value>,
    ) -> Result<usize, SnapshotError> {
        self.ensure_writable(name)?;
        let mut existing = self.find(name)?;
        let inserted = documents.len();
        existing.extend(documents);
        self.write_documents(name, &existing)?;
        Ok(inserted)
    }

    pub fn logout(self) {
        tracing::debug!(user = %self.username, "repository session closed");
    }

    fn ensure_writable(&self, name: &CollectionName) -> Result<(), SnapshotError> {
        if name.namespace() != self.username {
            return Err(SnapshotError::PermissionDenied {
                user: self.username.clone(),
                collection: name.to_string(),
            });
        }
        Ok(())
    }

    fn write_documents(
        &self,
        name: &CollectionName,
        documents: &[Value],
    ) -> Result<(), SnapshotError> {
        let content = serde_json::to_vec(documents)
            .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.collection_path(name), &content)
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SnapshotError> {
    let parent = path
        .parent()
        .ok_or_else(|| SnapshotError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".civic-snapshot")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SnapshotError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_files_live_under_collections_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let repo = Repository::new(root);
        let credentials = Credentials {
            username: "ns".to_string(),
            password: "secret".to_string(),
        };
        repo.init(&credentials).unwrap();
        let session = repo.connect(&credentials).unwrap();

        let name: CollectionName = "ns.a".parse().unwrap();
        assert!(session.collection_path(&name).ends_with("collections/ns.a.json"));
    }
}
