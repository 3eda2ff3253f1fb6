//! Vehicle registry and identity directory implementations.
//!
//! The JSON-backed registry keeps the whole list in memory behind a RwLock
//! and rewrites the file on every mutation, so `lookup` reads never race a
//! registration.

use crate::clock::Clock;
use crate::verify::{IdentityDirectory, VehicleRegistry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::access::{Identity, RegisteredVehicle, RegistrationOutcome};
use common::validation::normalize_plate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// In-memory vehicle registry.
pub struct MemoryVehicleRegistry {
    vehicles: RwLock<BTreeMap<String, RegisteredVehicle>>,
    clock: Arc<dyn Clock>,
}

impl MemoryVehicleRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            vehicles: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

fn register_in(
    vehicles: &mut BTreeMap<String, RegisteredVehicle>,
    plate: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> RegistrationOutcome {
    let plate = normalize_plate(plate);
    if plate.is_empty() {
        return RegistrationOutcome {
            success: false,
            message: "plate must not be empty".to_string(),
        };
    }
    if vehicles.contains_key(&plate) {
        return RegistrationOutcome {
            success: false,
            message: "plate already registered".to_string(),
        };
    }

    vehicles.insert(
        plate.clone(),
        RegisteredVehicle {
            plate,
            registered_at: now,
        },
    );
    RegistrationOutcome {
        success: true,
        message: "plate registered successfully".to_string(),
    }
}

#[async_trait]
impl VehicleRegistry for MemoryVehicleRegistry {
    async fn lookup(&self, plate: &str) -> Result<bool> {
        let vehicles = self.vehicles.read().await;
        Ok(vehicles.contains_key(&normalize_plate(plate)))
    }

    async fn register(&self, plate: &str) -> Result<RegistrationOutcome> {
        let mut vehicles = self.vehicles.write().await;
        Ok(register_in(&mut vehicles, plate, self.clock.now()))
    }

    async fn remove(&self, plate: &str) -> Result<bool> {
        let mut vehicles = self.vehicles.write().await;
        Ok(vehicles.remove(&normalize_plate(plate)).is_some())
    }

    async fn list(&self) -> Result<Vec<RegisteredVehicle>> {
        let vehicles = self.vehicles.read().await;
        Ok(vehicles.values().cloned().collect())
    }
}

/// Vehicle registry persisted as a JSON file of registered vehicles.
/// A corrupt file denies everyone (starts empty) rather than failing open.
pub struct JsonVehicleRegistry {
    path: PathBuf,
    vehicles: RwLock<BTreeMap<String, RegisteredVehicle>>,
    clock: Arc<dyn Clock>,
}

impl JsonVehicleRegistry {
    pub async fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut vehicles = BTreeMap::new();
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            match serde_json::from_str::<Vec<RegisteredVehicle>>(&raw) {
                Ok(entries) => {
                    for entry in entries {
                        vehicles.insert(entry.plate.clone(), entry);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "vehicle registry unreadable, starting empty");
                }
            }
        }

        Ok(Self {
            path,
            vehicles: RwLock::new(vehicles),
            clock,
        })
    }

    async fn persist(&self, vehicles: &BTreeMap<String, RegisteredVehicle>) -> Result<()> {
        let entries: Vec<&RegisteredVehicle> = vehicles.values().collect();
        let raw = serde_json::to_vec_pretty(&entries).context("failed to serialize vehicle registry")?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl VehicleRegistry for JsonVehicleRegistry {
    async fn lookup(&self, plate: &str) -> Result<bool> {
        let vehicles = self.vehicles.read().await;
        Ok(vehicles.contains_key(&normalize_plate(plate)))
    }

    async fn register(&self, plate: &str) -> Result<RegistrationOutcome> {
        let mut vehicles = self.vehicles.write().await;
        let outcome = register_in(&mut vehicles, plate, self.clock.now());
        if outcome.success {
            self.persist(&vehicles).await?;
        }
        Ok(outcome)
    }

    async fn remove(&self, plate: &str) -> Result<bool> {
        let mut vehicles = self.vehicles.write().await;
        let removed = vehicles.remove(&normalize_plate(plate)).is_some();
        if removed {
            self.persist(&vehicles).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<RegisteredVehicle>> {
        let vehicles = self.vehicles.read().await;
        Ok(vehicles.values().cloned().collect())
    }
}

struct DirectoryInner {
    users: BTreeMap<u32, Identity>,
    next_id: u32,
}

/// In-memory identity directory. Registration dedupes on external id and
/// returns the existing record.
pub struct MemoryIdentityDirectory {
    inner: RwLock<DirectoryInner>,
    clock: Arc<dyn Clock>,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(crate::clock::SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(DirectoryInner {
                users: BTreeMap::new(),
                next_id: 1,
            }),
            clock,
        }
    }
}

impl Default for MemoryIdentityDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn lookup_identity(&self, identity_id: u32) -> Result<Option<Identity>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&identity_id).cloned())
    }

    async fn add_identity(&self, name: &str, external_id: &str, email: &str) -> Result<Identity> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .users
            .values()
            .find(|user| user.external_id == external_id)
        {
            return Ok(existing.clone());
        }

        let identity = Identity {
            id: inner.next_id,
            name: name.to_string(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            registered_at: self.clock.now(),
        };
        inner.next_id += 1;
        inner.users.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn test_duplicate_registration_is_a_non_error_outcome() {
        let registry = MemoryVehicleRegistry::new(Arc::new(SystemClock));

        let first = registry.register("AB123CD").await.expect("register");
        assert!(first.success);

        let second = registry.register("ab 123 cd").await.expect("register");
        assert!(!second.success);
        assert!(second.message.contains("already registered"));

        assert_eq!(registry.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_is_normalized() {
        let registry = MemoryVehicleRegistry::new(Arc::new(SystemClock));
        registry.register("AB123CD").await.expect("register");

        assert!(registry.lookup(" ab 123 cd ").await.expect("lookup"));
        assert!(!registry.lookup("XY999").await.expect("lookup"));
    }

    #[tokio::test]
    async fn test_remove_vehicle() {
        let registry = MemoryVehicleRegistry::new(Arc::new(SystemClock));
        registry.register("AB123CD").await.expect("register");

        assert!(registry.remove("AB123CD").await.expect("remove"));
        assert!(!registry.remove("AB123CD").await.expect("remove"));
        assert!(!registry.lookup("AB123CD").await.expect("lookup"));
    }

    #[tokio::test]
    async fn test_json_registry_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registered_vehicles.json");

        {
            let registry = JsonVehicleRegistry::open(&path, Arc::new(SystemClock))
                .await
                .expect("open");
            let outcome = registry.register("AB123CD").await.expect("register");
            assert!(outcome.success);
        }

        let reopened = JsonVehicleRegistry::open(&path, Arc::new(SystemClock))
            .await
            .expect("reopen");
        assert!(reopened.lookup("AB123CD").await.expect("lookup"));

        let duplicate = reopened.register("AB123CD").await.expect("register");
        assert!(!duplicate.success);
    }

    #[tokio::test]
    async fn test_json_registry_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registered_vehicles.json");
        std::fs::write(&path, "{ not json").expect("write");

        let registry = JsonVehicleRegistry::open(&path, Arc::new(SystemClock))
            .await
            .expect("open");
        assert!(registry.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_identity_directory_dedupes_on_external_id() {
        let directory = MemoryIdentityDirectory::new();

        let alice = directory
            .add_identity("Alice", "ID-1", "alice@example.com")
            .await
            .expect("add");
        assert_eq!(alice.id, 1);

        let again = directory
            .add_identity("Alice A.", "ID-1", "other@example.com")
            .await
            .expect("add");
        assert_eq!(again.id, alice.id);
        assert_eq!(again.name, "Alice");

        let bob = directory
            .add_identity("Bob", "ID-2", "bob@example.com")
            .await
            .expect("add");
        assert_eq!(bob.id, 2);

        assert_eq!(
            directory
                .lookup_identity(1)
                .await
                .expect("lookup")
                .map(|identity| identity.name),
            Some("Alice".to_string())
        );
        assert!(directory.lookup_identity(99).await.expect("lookup").is_none());
    }
}
