//! Device registry.
//!
//! Devices are the parent entities qubit and gate records hang off. Unlike
//! the version logs, the registry is a plain mutable store with an archived
//! flag and no version history; the ledger only ever asks it "does this
//! device currently exist".

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// A quantum device registered with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device id such as `"7-qubit-prototype"`.
    pub device_id: String,
    /// Optional short description of the device.
    pub description: Option<String>,
}

impl Device {
    pub fn new(device_id: impl Into<String>, description: Option<String>) -> Self {
        Self {
            device_id: device_id.into(),
            description,
        }
    }

    /// Check boundary invariants before the record reaches the registry.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.device_id.is_empty() {
            return Err(LedgerError::Validation {
                field: "device_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Existence/description oracle consulted by the guard layer and the
/// aggregator. An archived device does not exist as far as this trait is
/// concerned.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Whether the device currently exists and is not archived.
    async fn exists(&self, device_id: &str) -> LedgerResult<bool>;

    /// The device, or `None` if missing or archived.
    async fn get(&self, device_id: &str) -> LedgerResult<Option<Device>>;
}

/// SQLite-backed device registry.
pub struct SqliteDeviceRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDeviceRegistry {
    /// Create a registry over an existing connection, initializing the
    /// table if it does not exist yet.
    pub fn new(conn: Arc<Mutex<Connection>>) -> LedgerResult<Self> {
        let registry = Self { conn };
        registry.init_schema()?;
        Ok(registry)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }

    fn init_schema(&self) -> LedgerResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                device_id TEXT PRIMARY KEY,
                description TEXT,
                archived INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_devices_archived ON devices(archived);
            "#,
        )?;
        Ok(())
    }

    /// Register a new device. The id must be unique even among archived
    /// devices; ids are never reusable.
    pub async fn create(&self, device: &Device) -> LedgerResult<()> {
        device.validate()?;
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO devices (device_id, description, archived) VALUES (?1, ?2, 0)",
            rusqlite::params![device.device_id, device.description],
        )?;
        if inserted == 0 {
            return Err(LedgerError::DeviceExists(device.device_id.clone()));
        }
        debug!(device_id = %device.device_id, "registered device");
        Ok(())
    }

    /// All non-archived devices, ordered by id.
    pub async fn list(&self) -> LedgerResult<Vec<Device>> {
        self.list_where(false)
    }

    /// All archived devices, ordered by id.
    pub async fn list_archived(&self) -> LedgerResult<Vec<Device>> {
        self.list_where(true)
    }

    fn list_where(&self, archived: bool) -> LedgerResult<Vec<Device>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, description FROM devices WHERE archived = ?1 ORDER BY device_id",
        )?;
        let mut rows = stmt.query(rusqlite::params![archived])?;
        let mut devices = Vec::new();
        while let Some(row) = rows.next()? {
            devices.push(Device {
                device_id: row.get(0)?,
                description: row.get(1)?,
            });
        }
        Ok(devices)
    }

    /// Update a device's description. Fails if the device is missing or
    /// archived.
    pub async fn update(&self, device: &Device) -> LedgerResult<()> {
        device.validate()?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE devices SET description = ?2 WHERE device_id = ?1 AND archived = 0",
            rusqlite::params![device.device_id, device.description],
        )?;
        if updated == 0 {
            return Err(LedgerError::DeviceNotFound(device.device_id.clone()));
        }
        Ok(())
    }

    /// Set the archived flag. Fails if the device is missing or already
    /// archived.
    pub async fn archive(&self, device_id: &str) -> LedgerResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE devices SET archived = 1 WHERE device_id = ?1 AND archived = 0",
            rusqlite::params![device_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::DeviceNotFound(device_id.to_string()));
        }
        debug!(device_id, "archived device");
        Ok(())
    }

    /// Clear the archived flag. Fails if the device was never created.
    /// Restoring a live device is a no-op.
    pub async fn restore(&self, device_id: &str) -> LedgerResult<Device> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE devices SET archived = 0 WHERE device_id = ?1",
            rusqlite::params![device_id],
        )?;
        let mut stmt =
            conn.prepare("SELECT device_id, description FROM devices WHERE device_id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![device_id])?;
        if let Some(row) = rows.next()? {
            debug!(device_id, "restored device");
            Ok(Device {
                device_id: row.get(0)?,
                description: row.get(1)?,
            })
        } else {
            Err(LedgerError::DeviceNotFound(device_id.to_string()))
        }
    }
}

#[async_trait]
impl DeviceRegistry for SqliteDeviceRegistry {
    async fn exists(&self, device_id: &str) -> LedgerResult<bool> {
        Ok(self.get(device_id).await?.is_some())
    }

    async fn get(&self, device_id: &str) -> LedgerResult<Option<Device>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, description FROM devices WHERE device_id = ?1 AND archived = 0",
        )?;
        let mut rows = stmt.query(rusqlite::params![device_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Device {
                device_id: row.get(0)?,
                description: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> SqliteDeviceRegistry {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        SqliteDeviceRegistry::new(conn).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = test_registry();
        let device = Device::new("alpha", Some("first device".to_string()));

        registry.create(&device).await.unwrap();
        assert!(registry.exists("alpha").await.unwrap());
        assert_eq!(registry.get("alpha").await.unwrap(), Some(device));
        assert!(registry.get("beta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_id_never_reusable() {
        let registry = test_registry();
        registry.create(&Device::new("alpha", None)).await.unwrap();

        let err = registry.create(&Device::new("alpha", None)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DeviceExists(_)));

        // Archival does not free the id.
        registry.archive("alpha").await.unwrap();
        let err = registry.create(&Device::new("alpha", None)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DeviceExists(_)));
    }

    #[tokio::test]
    async fn test_archive_and_restore() {
        let registry = test_registry();
        registry
            .create(&Device::new("alpha", Some("desc".to_string())))
            .await
            .unwrap();

        registry.archive("alpha").await.unwrap();
        assert!(!registry.exists("alpha").await.unwrap());
        assert_eq!(registry.list().await.unwrap().len(), 0);
        assert_eq!(registry.list_archived().await.unwrap().len(), 1);

        // Archiving twice fails, as does archiving an unknown id.
        assert!(matches!(
            registry.archive("alpha").await.unwrap_err(),
            LedgerError::DeviceNotFound(_)
        ));
        assert!(matches!(
            registry.archive("missing").await.unwrap_err(),
            LedgerError::DeviceNotFound(_)
        ));

        let restored = registry.restore("alpha").await.unwrap();
        assert_eq!(restored.description.as_deref(), Some("desc"));
        assert!(registry.exists("alpha").await.unwrap());

        assert!(matches!(
            registry.restore("missing").await.unwrap_err(),
            LedgerError::DeviceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_description() {
        let registry = test_registry();
        registry.create(&Device::new("alpha", None)).await.unwrap();

        registry
            .update(&Device::new("alpha", Some("updated".to_string())))
            .await
            .unwrap();
        let device = registry.get("alpha").await.unwrap().unwrap();
        assert_eq!(device.description.as_deref(), Some("updated"));

        assert!(matches!(
            registry.update(&Device::new("missing", None)).await.unwrap_err(),
            LedgerError::DeviceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let registry = test_registry();
        registry.create(&Device::new("gamma", None)).await.unwrap();
        registry.create(&Device::new("alpha", None)).await.unwrap();
        registry.create(&Device::new("beta", None)).await.unwrap();

        let ids: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
    }
}
