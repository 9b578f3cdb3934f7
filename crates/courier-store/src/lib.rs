//! # courier-store
//!
//! Filesystem credential store for the Courier gateway.
//!
//! One directory per tenant under a configured root, named by a stable
//! convention (`auth-<tenant_id>`) so the startup sweep can discover all
//! previously-authenticated tenants without a separate index. The blob
//! content is opaque to the gateway: whatever the protocol client hands
//! back on `credentials.update` is persisted verbatim.
//!
//! ## Listing vs presence
//!
//! [`CredentialStore::list_known_tenants`] is a pure directory-name scan
//! and can return false positives (an empty or stale directory left behind
//! by a crashed process). Callers that act on the listing — the startup
//! reconnect sweep in particular — must re-validate each entry with
//! [`CredentialStore::has_credentials`] before trusting it.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{StoreError, TenantId};

/// Directory-name prefix for per-tenant credential slots.
const SLOT_PREFIX: &str = "auth-";

/// Blob file name inside a tenant's slot directory.
const BLOB_FILE: &str = "creds.json";

/// Opaque persisted authentication state for one tenant.
///
/// The gateway never inspects the contents; it round-trips whatever the
/// protocol client produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

impl Credentials {
    /// A fresh, never-authenticated slot.
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

/// Per-tenant credential persistence rooted at a single directory.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(format!("{SLOT_PREFIX}{tenant}"))
    }

    fn blob_path(&self, tenant: &TenantId) -> PathBuf {
        self.slot_dir(tenant).join(BLOB_FILE)
    }

    /// Load the tenant's credential blob.
    pub fn load(&self, tenant: &TenantId) -> Result<Credentials, StoreError> {
        let path = self.blob_path(tenant);
        if !path.is_file() {
            return Err(StoreError::NotFound);
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map(Credentials)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Load the tenant's blob, creating an empty slot if none exists.
    ///
    /// Used by session creation: a tenant with no prior credentials starts
    /// from an empty slot and authenticates via QR.
    pub fn load_or_init(&self, tenant: &TenantId) -> Result<Credentials, StoreError> {
        match self.load(tenant) {
            Ok(credentials) => Ok(credentials),
            Err(StoreError::NotFound) => {
                let empty = Credentials::empty();
                self.save(tenant, &empty)?;
                Ok(empty)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the tenant's credential blob.
    ///
    /// Written to a temp file in the slot directory and renamed into place
    /// so a reader never observes a partial blob.
    pub fn save(&self, tenant: &TenantId, credentials: &Credentials) -> Result<(), StoreError> {
        let dir = self.slot_dir(tenant);
        std::fs::create_dir_all(&dir)?;
        let payload = serde_json::to_vec(&credentials.0)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = dir.join(format!("{BLOB_FILE}.tmp"));
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, self.blob_path(tenant))?;
        Ok(())
    }

    /// Remove all persisted material for the tenant.
    ///
    /// Idempotent: deleting an absent slot succeeds. After this call,
    /// [`CredentialStore::load`] returns `NotFound`.
    pub fn delete(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let dir = self.slot_dir(tenant);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(tenant = %tenant, "credential slot purged");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Tenants with a credential slot directory, by naming convention.
    ///
    /// Order is unspecified. May include tenants whose blob is missing or
    /// corrupt; see the module docs.
    pub fn list_known_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut tenants = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = name.strip_prefix(SLOT_PREFIX) else {
                continue;
            };
            if let Ok(tenant) = TenantId::new(id) {
                tenants.push(tenant);
            }
        }
        Ok(tenants)
    }

    /// Content-level presence check: the blob exists and parses.
    ///
    /// Stricter than the listing — this is what the startup sweep uses to
    /// reject listing false positives.
    pub fn has_credentials(&self, tenant: &TenantId) -> bool {
        self.load(tenant).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_load_round_trip() {
        let (_dir, store) = store();
        let t = tenant("42");
        let creds = Credentials(json!({"noise_key": "abc", "registered": true}));
        store.save(&t, &creds).unwrap();
        assert_eq!(store.load(&t).unwrap(), creds);
        assert!(store.has_credentials(&t));
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, store) = store();
        assert_matches!(store.load(&tenant("ghost")), Err(StoreError::NotFound));
        assert!(!store.has_credentials(&tenant("ghost")));
    }

    #[test]
    fn load_or_init_creates_empty_slot() {
        let (_dir, store) = store();
        let t = tenant("fresh");
        let creds = store.load_or_init(&t).unwrap();
        assert_eq!(creds, Credentials::empty());
        // Slot now persisted
        assert!(store.has_credentials(&t));
    }

    #[test]
    fn delete_removes_everything_and_is_idempotent() {
        let (_dir, store) = store();
        let t = tenant("42");
        store.save(&t, &Credentials::empty()).unwrap();
        store.delete(&t).unwrap();
        assert_matches!(store.load(&t), Err(StoreError::NotFound));
        // Second delete is a no-op success
        store.delete(&t).unwrap();
    }

    #[test]
    fn list_discovers_saved_tenants() {
        let (_dir, store) = store();
        for id in ["a", "b", "c"] {
            store.save(&tenant(id), &Credentials::empty()).unwrap();
        }
        let mut listed: Vec<String> = store
            .list_known_tenants()
            .unwrap()
            .into_iter()
            .map(|t| t.as_str().to_string())
            .collect();
        listed.sort();
        assert_eq!(listed, vec!["a", "b", "c"]);
    }

    #[test]
    fn listing_false_positive_rejected_by_presence_check() {
        let (dir, store) = store();
        // Stale empty slot directory with no blob inside
        std::fs::create_dir_all(dir.path().join("auth-stale")).unwrap();
        let listed = store.list_known_tenants().unwrap();
        assert!(listed.iter().any(|t| t.as_str() == "stale"));
        assert!(!store.has_credentials(&tenant("stale")));
    }

    #[test]
    fn corrupt_blob_fails_load_and_presence() {
        let (dir, store) = store();
        let slot = dir.path().join("auth-bad");
        std::fs::create_dir_all(&slot).unwrap();
        std::fs::write(slot.join("creds.json"), "{not-json").unwrap();
        assert_matches!(store.load(&tenant("bad")), Err(StoreError::Corrupt(_)));
        assert!(!store.has_credentials(&tenant("bad")));
    }

    #[test]
    fn unrelated_directories_ignored_by_listing() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("auth-file"), "not a dir").unwrap();
        assert!(store.list_known_tenants().unwrap().is_empty());
    }
}
