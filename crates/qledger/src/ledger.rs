//! The device ledger: guarded writes and composite snapshot reads.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::clock::{Clock, MonotonicClock, Timestamp};
use crate::device::{Device, DeviceRegistry, SqliteDeviceRegistry};
use crate::error::{LedgerError, LedgerResult};
use crate::gate::{Gate, GateKey};
use crate::qubit::{Qubit, QubitKey};
use crate::store::{SqliteVersionLog, VersionLog, VersionRecord};
use crate::summary::DeviceSummary;

/// Facade over the device registry and the qubit/gate version logs.
///
/// Writes pass through referential guards: a qubit needs a live device, a
/// gate additionally needs a live qubit. The guards run at write time only;
/// archiving a qubit later does not invalidate gates already recorded
/// against it. Those drop out of summaries instead.
pub struct DeviceLedger {
    devices: Arc<SqliteDeviceRegistry>,
    qubits: Arc<dyn VersionLog<Qubit>>,
    gates: Arc<dyn VersionLog<Gate>>,
}

impl DeviceLedger {
    /// Open (or create) a ledger backed by a SQLite file.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        Self::with_clock(Connection::open(path)?, Arc::new(MonotonicClock::new()))
    }

    /// Create a ledger backed by an in-memory database.
    pub fn in_memory() -> LedgerResult<Self> {
        Self::with_clock(
            Connection::open_in_memory()?,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Create a ledger over `conn` with an injected clock. Both version
    /// logs share the clock, so timestamps stay globally monotonic across
    /// the whole ledger.
    pub fn with_clock(conn: Connection, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            devices: Arc::new(SqliteDeviceRegistry::new(Arc::clone(&conn))?),
            qubits: Arc::new(SqliteVersionLog::new(Arc::clone(&conn), Arc::clone(&clock))?),
            gates: Arc::new(SqliteVersionLog::new(conn, clock)?),
        })
    }

    /// The underlying device registry, for direct registry queries.
    pub fn registry(&self) -> &SqliteDeviceRegistry {
        &self.devices
    }

    // --- devices ---

    /// Register a new device. The id must be unique even among archived
    /// devices.
    pub async fn create_device(
        &self,
        device_id: &str,
        description: Option<&str>,
    ) -> LedgerResult<()> {
        self.devices
            .create(&Device::new(device_id, description.map(str::to_string)))
            .await
    }

    /// Update a device's description.
    pub async fn update_device(
        &self,
        device_id: &str,
        description: Option<&str>,
    ) -> LedgerResult<()> {
        self.devices
            .update(&Device::new(device_id, description.map(str::to_string)))
            .await
    }

    /// All live devices, sorted by id.
    pub async fn devices(&self) -> LedgerResult<Vec<Device>> {
        self.devices.list().await
    }

    /// All archived devices, sorted by id.
    pub async fn archived_devices(&self) -> LedgerResult<Vec<Device>> {
        self.devices.list_archived().await
    }

    /// Archive a device together with every live qubit and gate on it.
    /// Each cascaded tombstone is an ordinary append, so the device's full
    /// pre-archival state stays reachable through as-of queries.
    pub async fn archive_device(&self, device_id: &str) -> LedgerResult<()> {
        self.devices.archive(device_id).await?;

        for gate in self.gates.list_current(&GateKey::device_prefix(device_id)).await? {
            self.gates.tombstone(&gate.key()).await?;
        }
        for qubit in self
            .qubits
            .list_current(&QubitKey::device_prefix(device_id))
            .await?
        {
            self.qubits.tombstone(&qubit.key()).await?;
        }
        debug!(device_id, "archived device with cascade");
        Ok(())
    }

    /// Un-archive a device and revive every tombstoned qubit and gate on
    /// it, each revival appending a live version carrying the last known
    /// payload. Fails if the device was never created.
    pub async fn restore_device(&self, device_id: &str) -> LedgerResult<Device> {
        let device = self.devices.restore(device_id).await?;

        for qubit in self
            .qubits
            .list_tombstoned(&QubitKey::device_prefix(device_id))
            .await?
        {
            self.qubits.revive(&qubit.key()).await?;
        }
        for gate in self
            .gates
            .list_tombstoned(&GateKey::device_prefix(device_id))
            .await?
        {
            self.gates.revive(&gate.key()).await?;
        }
        debug!(device_id, "restored device with cascade");
        Ok(device)
    }

    // --- qubits ---

    /// Record new qubit measurements, returning the timestamp assigned to
    /// this write. Fails with
    /// [`MissingReference`](LedgerError::MissingReference) if the device
    /// does not currently exist.
    pub async fn save_qubit(&self, qubit: &Qubit) -> LedgerResult<Timestamp> {
        qubit.validate()?;
        self.require_device(&qubit.device_id).await?;
        self.qubits.append(qubit).await
    }

    /// Current measurements for a qubit, or `None` if never saved or
    /// deleted.
    pub async fn qubit(&self, device_id: &str, qubit_id: u32) -> LedgerResult<Option<Qubit>> {
        self.qubits.current(&QubitKey::new(device_id, qubit_id)).await
    }

    /// Qubit measurements visible strictly before `at`.
    pub async fn qubit_as_of(
        &self,
        device_id: &str,
        qubit_id: u32,
        at: Timestamp,
    ) -> LedgerResult<Option<Qubit>> {
        self.qubits.as_of(&QubitKey::new(device_id, qubit_id), at).await
    }

    /// All currently visible qubits of a device, sorted by qubit id.
    pub async fn qubits_by_device(&self, device_id: &str) -> LedgerResult<Vec<Qubit>> {
        self.qubits.list_current(&QubitKey::device_prefix(device_id)).await
    }

    /// All qubits of a device visible strictly before `at`.
    pub async fn qubits_by_device_as_of(
        &self,
        device_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Vec<Qubit>> {
        self.qubits
            .list_as_of(&QubitKey::device_prefix(device_id), at)
            .await
    }

    /// Archive a qubit, returning the tombstone's timestamp; querying
    /// as-of that timestamp recovers the last live state. Fails with
    /// [`NotFound`](LedgerError::NotFound) if the qubit has no current
    /// version.
    pub async fn delete_qubit(&self, device_id: &str, qubit_id: u32) -> LedgerResult<Timestamp> {
        self.qubits.tombstone(&QubitKey::new(device_id, qubit_id)).await
    }

    // --- gates ---

    /// Record new gate measurements, returning the timestamp assigned to
    /// this write. Fails with
    /// [`MissingReference`](LedgerError::MissingReference) if the device or
    /// the qubit does not currently exist.
    pub async fn save_gate(&self, gate: &Gate) -> LedgerResult<Timestamp> {
        gate.validate()?;
        self.require_device(&gate.device_id).await?;
        if self
            .qubits
            .current(&QubitKey::new(gate.device_id.clone(), gate.qubit_id))
            .await?
            .is_none()
        {
            return Err(LedgerError::MissingReference(format!(
                "qubit {} on device {} does not exist",
                gate.qubit_id, gate.device_id,
            )));
        }
        self.gates.append(gate).await
    }

    /// Current measurements for a gate, or `None` if never saved or
    /// deleted.
    pub async fn gate(
        &self,
        device_id: &str,
        qubit_id: u32,
        gate_id: &str,
    ) -> LedgerResult<Option<Gate>> {
        self.gates
            .current(&GateKey::new(device_id, qubit_id, gate_id))
            .await
    }

    /// Gate measurements visible strictly before `at`.
    pub async fn gate_as_of(
        &self,
        device_id: &str,
        qubit_id: u32,
        gate_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Option<Gate>> {
        self.gates
            .as_of(&GateKey::new(device_id, qubit_id, gate_id), at)
            .await
    }

    /// All currently visible gates of one qubit, sorted by gate id.
    pub async fn gates_by_qubit(
        &self,
        device_id: &str,
        qubit_id: u32,
    ) -> LedgerResult<Vec<Gate>> {
        self.gates
            .list_current(&GateKey::qubit_prefix(device_id, qubit_id))
            .await
    }

    /// All currently visible gates of a device, sorted by key.
    pub async fn gates_by_device(&self, device_id: &str) -> LedgerResult<Vec<Gate>> {
        self.gates.list_current(&GateKey::device_prefix(device_id)).await
    }

    /// All gates of a device visible strictly before `at`.
    pub async fn gates_by_device_as_of(
        &self,
        device_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Vec<Gate>> {
        self.gates
            .list_as_of(&GateKey::device_prefix(device_id), at)
            .await
    }

    /// Archive a gate, returning the tombstone's timestamp.
    pub async fn delete_gate(
        &self,
        device_id: &str,
        qubit_id: u32,
        gate_id: &str,
    ) -> LedgerResult<Timestamp> {
        self.gates
            .tombstone(&GateKey::new(device_id, qubit_id, gate_id))
            .await
    }

    // --- summaries ---

    /// The current state of a device: its visible qubits (sorted by id)
    /// and their visible gates. Fails with
    /// [`DeviceNotFound`](LedgerError::DeviceNotFound) if the device is
    /// missing or archived.
    ///
    /// The registry lookup and the two listings are three independent
    /// reads; under concurrent writers the summary can mix states from
    /// slightly different instants. For a self-consistent historical view
    /// use [`snapshot`](Self::snapshot) with a fixed timestamp.
    pub async fn device(&self, device_id: &str) -> LedgerResult<DeviceSummary> {
        let device = self
            .devices
            .get(device_id)
            .await?
            .ok_or_else(|| LedgerError::DeviceNotFound(device_id.to_string()))?;

        let qubits = self
            .qubits
            .list_current(&QubitKey::device_prefix(device_id))
            .await?;
        let gates = self
            .gates
            .list_current(&GateKey::device_prefix(device_id))
            .await?;
        debug!(device_id, qubits = qubits.len(), gates = gates.len(), "composed summary");
        Ok(DeviceSummary::compose(device, qubits, gates))
    }

    /// The state of a device as of `at` (exclusive). The registry keeps no
    /// history, so the device itself resolves against present state; only
    /// the qubit and gate logs time-travel.
    pub async fn snapshot(&self, device_id: &str, at: Timestamp) -> LedgerResult<DeviceSummary> {
        let device = self
            .devices
            .get(device_id)
            .await?
            .ok_or_else(|| LedgerError::DeviceNotFound(device_id.to_string()))?;

        let qubits = self
            .qubits
            .list_as_of(&QubitKey::device_prefix(device_id), at)
            .await?;
        let gates = self
            .gates
            .list_as_of(&GateKey::device_prefix(device_id), at)
            .await?;
        debug!(device_id, %at, qubits = qubits.len(), gates = gates.len(), "composed snapshot");
        Ok(DeviceSummary::compose(device, qubits, gates))
    }

    async fn require_device(&self, device_id: &str) -> LedgerResult<()> {
        if self.devices.exists(device_id).await? {
            Ok(())
        } else {
            Err(LedgerError::MissingReference(format!(
                "device {device_id} does not exist",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn test_ledger() -> DeviceLedger {
        DeviceLedger::with_clock(
            Connection::open_in_memory().unwrap(),
            Arc::new(ManualClock::new()),
        )
        .unwrap()
    }

    async fn sample_ledger() -> DeviceLedger {
        let ledger = test_ledger();
        ledger.create_device("sample", Some("Sample device")).await.unwrap();
        ledger
            .save_qubit(&Qubit::new("sample", 0).with_frequency(0.0).with_t1(0.0).with_t2(0.0))
            .await
            .unwrap();
        ledger
            .save_qubit(&Qubit::new("sample", 1).with_frequency(1.0).with_t1(1.0).with_t2(1.0))
            .await
            .unwrap();
        ledger
            .save_gate(&Gate::new("sample", 0, "+X").with_amplitude(0.0).with_width(0.0).with_phase(0.0))
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_save_qubit_requires_device() {
        let ledger = test_ledger();

        let err = ledger.save_qubit(&Qubit::new("ghost", 0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));

        ledger.create_device("real", None).await.unwrap();
        ledger.save_qubit(&Qubit::new("real", 0)).await.unwrap();

        // Archived devices reject writes too.
        ledger.archive_device("real").await.unwrap();
        let err = ledger.save_qubit(&Qubit::new("real", 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));
    }

    #[tokio::test]
    async fn test_save_gate_requires_device_and_qubit() {
        let ledger = test_ledger();
        ledger.create_device("alpha", None).await.unwrap();

        let err = ledger.save_gate(&Gate::new("ghost", 0, "+X")).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));

        let err = ledger.save_gate(&Gate::new("alpha", 0, "+X")).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));

        ledger.save_qubit(&Qubit::new("alpha", 0)).await.unwrap();
        ledger.save_gate(&Gate::new("alpha", 0, "+X")).await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_is_write_time_only() {
        let ledger = test_ledger();
        ledger.create_device("alpha", None).await.unwrap();
        ledger.save_qubit(&Qubit::new("alpha", 0)).await.unwrap();
        ledger.save_gate(&Gate::new("alpha", 0, "+X")).await.unwrap();

        // Deleting the qubit does not retroactively invalidate the gate
        // record; it only drops out of summaries.
        ledger.delete_qubit("alpha", 0).await.unwrap();
        assert!(ledger.gate("alpha", 0, "+X").await.unwrap().is_some());

        // But new gate writes for the archived qubit are rejected.
        let err = ledger.save_gate(&Gate::new("alpha", 0, "+Y")).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));
    }

    #[tokio::test]
    async fn test_device_summary_sample_walkthrough() {
        let ledger = sample_ledger().await;

        let summary = ledger.device("sample").await.unwrap();
        assert_eq!(summary.device_id, "sample");
        assert_eq!(summary.description.as_deref(), Some("Sample device"));
        let ids: Vec<u32> = summary.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(summary.gates_for(0).unwrap().len(), 1);
        assert_eq!(summary.gates_for(0).unwrap()[0].gate_id, "+X");
        assert_eq!(summary.gates_for(1), Some(&[] as &[Gate]));

        // Deleting qubit 0 drops it and its gate from the summary.
        ledger.delete_qubit("sample", 0).await.unwrap();
        let summary = ledger.device("sample").await.unwrap();
        let ids: Vec<u32> = summary.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![1]);
        assert!(summary.gates_for(0).is_none());

        let err = ledger.save_gate(&Gate::new("sample", 0, "+Z")).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingReference(_)));
    }

    #[tokio::test]
    async fn test_summary_for_missing_device_fails() {
        let ledger = test_ledger();
        let err = ledger.device("ghost").await.unwrap_err();
        assert!(matches!(err, LedgerError::DeviceNotFound(_)));

        let err = ledger.snapshot("ghost", Timestamp(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_time_travel() {
        let ledger = sample_ledger().await;

        let t_del = ledger.delete_qubit("sample", 0).await.unwrap();
        let t_new = ledger
            .save_qubit(&Qubit::new("sample", 1).with_t1(9.0))
            .await
            .unwrap();

        // As of the deletion both qubits and the gate were visible.
        let snapshot = ledger.snapshot("sample", t_del).await.unwrap();
        let ids: Vec<u32> = snapshot.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(snapshot.gates_for(0).unwrap().len(), 1);
        // Qubit 1 shows its pre-update measurements.
        assert_eq!(snapshot.qubit(1).unwrap().t1, Some(1.0));

        let snapshot = ledger.snapshot("sample", t_new).await.unwrap();
        let ids: Vec<u32> = snapshot.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![1]);

        // Before the first write: nothing.
        let snapshot = ledger.snapshot("sample", Timestamp(1)).await.unwrap();
        assert!(snapshot.qubits.is_empty());
        assert!(snapshot.gates.is_empty());
    }

    #[tokio::test]
    async fn test_archive_device_cascades() {
        let ledger = sample_ledger().await;

        ledger.archive_device("sample").await.unwrap();
        assert!(ledger.qubit("sample", 0).await.unwrap().is_none());
        assert!(ledger.qubit("sample", 1).await.unwrap().is_none());
        assert!(ledger.gate("sample", 0, "+X").await.unwrap().is_none());
        assert!(matches!(
            ledger.device("sample").await.unwrap_err(),
            LedgerError::DeviceNotFound(_)
        ));

        let restored = ledger.restore_device("sample").await.unwrap();
        assert_eq!(restored.device_id, "sample");
        let summary = ledger.device("sample").await.unwrap();
        let ids: Vec<u32> = summary.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(summary.gates_for(0).unwrap().len(), 1);
        // Revived records carry their last known measurements.
        assert_eq!(summary.qubit(1).unwrap().t1, Some(1.0));
    }

    #[tokio::test]
    async fn test_gate_listings() {
        let ledger = test_ledger();
        ledger.create_device("alpha", None).await.unwrap();
        ledger.save_qubit(&Qubit::new("alpha", 0)).await.unwrap();
        ledger.save_qubit(&Qubit::new("alpha", 1)).await.unwrap();
        ledger.save_gate(&Gate::new("alpha", 0, "+X")).await.unwrap();
        ledger.save_gate(&Gate::new("alpha", 0, "+Y")).await.unwrap();
        ledger.save_gate(&Gate::new("alpha", 1, "+X")).await.unwrap();

        assert_eq!(ledger.gates_by_qubit("alpha", 0).await.unwrap().len(), 2);
        assert_eq!(ledger.gates_by_qubit("alpha", 1).await.unwrap().len(), 1);
        assert_eq!(ledger.gates_by_device("alpha").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_validation_rejected_at_boundary() {
        let ledger = test_ledger();
        ledger.create_device("alpha", None).await.unwrap();

        assert!(matches!(
            ledger.save_qubit(&Qubit::new("", 0)).await.unwrap_err(),
            LedgerError::Validation { .. }
        ));
        assert!(matches!(
            ledger.save_gate(&Gate::new("alpha", 0, "")).await.unwrap_err(),
            LedgerError::Validation { .. }
        ));
        assert!(matches!(
            ledger.create_device("", None).await.unwrap_err(),
            LedgerError::Validation { .. }
        ));
    }
}
