//! Qubit calibration records.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{KeyPart, VersionKey, VersionRecord};

/// Key identifying a qubit within a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitKey {
    pub device_id: String,
    pub qubit_id: u32,
}

impl QubitKey {
    pub fn new(device_id: impl Into<String>, qubit_id: u32) -> Self {
        Self {
            device_id: device_id.into(),
            qubit_id,
        }
    }

    /// Prefix selecting every qubit of a device.
    pub fn device_prefix(device_id: &str) -> Vec<KeyPart> {
        vec![KeyPart::from(device_id)]
    }
}

impl VersionKey for QubitKey {
    const COLUMNS: &'static [(&'static str, &'static str)] =
        &[("device_id", "TEXT"), ("qubit_id", "INTEGER")];

    fn values(&self) -> Vec<KeyPart> {
        vec![
            KeyPart::from(self.device_id.clone()),
            KeyPart::from(self.qubit_id),
        ]
    }
}

/// Measured qubit parameters. Each measurement is independently optional:
/// a save records exactly the fields that were measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qubit {
    /// Device this qubit belongs to.
    pub device_id: String,
    /// Qubit index on the device.
    pub qubit_id: u32,
    /// Resonance frequency in GHz.
    pub resonance_frequency: Option<f64>,
    /// Coherence time constant T1 in microseconds.
    pub t1: Option<f64>,
    /// Coherence time constant T2 in microseconds.
    pub t2: Option<f64>,
}

impl Qubit {
    /// Create a qubit record with no measurements set.
    pub fn new(device_id: impl Into<String>, qubit_id: u32) -> Self {
        Self {
            device_id: device_id.into(),
            qubit_id,
            resonance_frequency: None,
            t1: None,
            t2: None,
        }
    }

    /// Set the resonance frequency in GHz.
    pub fn with_frequency(mut self, ghz: f64) -> Self {
        self.resonance_frequency = Some(ghz);
        self
    }

    /// Set T1 in microseconds.
    pub fn with_t1(mut self, micros: f64) -> Self {
        self.t1 = Some(micros);
        self
    }

    /// Set T2 in microseconds.
    pub fn with_t2(mut self, micros: f64) -> Self {
        self.t2 = Some(micros);
        self
    }

    /// Check boundary invariants before the record reaches a store.
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

impl VersionRecord for Qubit {
    type Key = QubitKey;

    const TABLE: &'static str = "qubits";

    fn key(&self) -> QubitKey {
        QubitKey::new(self.device_id.clone(), self.qubit_id)
    }
}
