//! Durable credential storage
//!
//! A JSON file mapping a tenant key to its single OAuth credential. The gateway
//! only ever uses one key today, but the store is keyed so that assumption lives
//! in configuration rather than in the storage format.
//!
//! Every mutation rewrites the file with temp-file + rename while the in-memory
//! map is locked, so a reader never observes a half-applied update and a crash
//! never leaves a truncated file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// OAuth credential for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for Web API calls
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    pub refresh_token: String,
    /// Absolute instant after which `access_token` is rejected
    pub expires_at: DateTime<Utc>,
}

/// File-backed credential store.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Credential>>,
}

impl CredentialStore {
    /// Load credentials from `path`.
    ///
    /// A missing file is a cold start: the store begins empty and `{}` is
    /// written so the directory and permissions are validated at startup.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Io(format!("checking credential file: {e}")))?
        {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: HashMap<String, Credential> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), tenants = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting uninitialized");
            let empty = HashMap::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// The credential stored for `tenant`, if authorization ever succeeded.
    pub async fn get_current(&self, tenant: &str) -> Option<Credential> {
        self.state.lock().await.get(tenant).cloned()
    }

    /// Drop whatever is stored for `tenant` and persist `credential` in its place.
    ///
    /// The in-memory map is only updated once the file write succeeded.
    pub async fn replace_all(&self, tenant: &str, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let replaced = next.insert(tenant.to_string(), credential).is_some();
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(tenant, replaced, "stored new credential");
        Ok(())
    }

    /// Update the mutable fields of the existing credential for `tenant`.
    ///
    /// `refresh_token` is only overwritten when `Some`; the authorization
    /// server may omit it on refresh and the previous one stays valid.
    /// Returns the credential as persisted.
    pub async fn update_in_place(
        &self,
        tenant: &str,
        access_token: String,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let mut updated = state
            .get(tenant)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no credential stored for tenant {tenant}")))?;

        let rotated = refresh_token.is_some();
        updated.access_token = access_token;
        updated.expires_at = expires_at;
        if let Some(refresh_token) = refresh_token {
            updated.refresh_token = refresh_token;
        }

        let mut next = state.clone();
        next.insert(tenant.to_string(), updated.clone());
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(tenant, rotated, %expires_at, "updated credential");
        Ok(updated)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write the credential map atomically with 0600 permissions on unix.
async fn write_atomic(path: &Path, data: &HashMap<String, Credential>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(suffix: &str) -> Credential {
        Credential {
            access_token: format!("at_{suffix}"),
            refresh_token: format!("rt_{suffix}"),
            expires_at: Utc::now() + Duration::seconds(3600),
        }
    }

    async fn empty_store(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn cold_start_is_uninitialized_and_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        assert!(!path.exists());
        let store = CredentialStore::load(path.clone()).await.unwrap();
        assert!(store.get_current("default").await.is_none());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, Credential> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn replace_all_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        let stored = credential("1");
        store.replace_all("default", stored.clone()).await.unwrap();

        let reloaded = CredentialStore::load(path).await.unwrap();
        assert_eq!(reloaded.get_current("default").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn replace_all_supersedes_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;

        store.replace_all("default", credential("old")).await.unwrap();
        store.replace_all("default", credential("new")).await.unwrap();

        let current = store.get_current("default").await.unwrap();
        assert_eq!(current.access_token, "at_new");
        assert_eq!(current.refresh_token, "rt_new");
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;

        store.replace_all("a", credential("a")).await.unwrap();
        store.replace_all("b", credential("b")).await.unwrap();

        assert_eq!(store.get_current("a").await.unwrap().access_token, "at_a");
        assert_eq!(store.get_current("b").await.unwrap().access_token, "at_b");
    }

    #[tokio::test]
    async fn update_in_place_keeps_refresh_token_when_not_reissued() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;
        store.replace_all("default", credential("1")).await.unwrap();

        let expires_at = Utc::now() + Duration::seconds(7200);
        let updated = store
            .update_in_place("default", "at_2".into(), expires_at, None)
            .await
            .unwrap();

        assert_eq!(updated.access_token, "at_2");
        assert_eq!(updated.refresh_token, "rt_1");
        assert_eq!(updated.expires_at, expires_at);
        assert_eq!(store.get_current("default").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_in_place_rotates_refresh_token_when_reissued() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;
        store.replace_all("default", credential("1")).await.unwrap();

        let updated = store
            .update_in_place("default", "at_2".into(), Utc::now(), Some("rt_2".into()))
            .await
            .unwrap();

        assert_eq!(updated.refresh_token, "rt_2");
    }

    #[tokio::test]
    async fn update_in_place_without_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;

        let err = store
            .update_in_place("default", "at".into(), Utc::now(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)), "got: {err:?}");
        assert!(store.get_current("default").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = CredentialStore::load(path).await;
        assert!(matches!(result, Err(Error::CredentialParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;
        store.replace_all("default", credential("1")).await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn expires_at_is_stored_as_rfc3339() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir).await;
        store.replace_all("default", credential("1")).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let expires_at = json["default"]["expires_at"].as_str().unwrap();
        assert!(
            DateTime::parse_from_rfc3339(expires_at).is_ok(),
            "expected RFC 3339 timestamp, got {expires_at}"
        );
    }
}
