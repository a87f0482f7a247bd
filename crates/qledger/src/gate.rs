//! Gate calibration records.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{KeyPart, VersionKey, VersionRecord};

/// Key identifying a gate on a specific qubit of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateKey {
    pub device_id: String,
    pub qubit_id: u32,
    pub gate_id: String,
}

impl GateKey {
    pub fn new(device_id: impl Into<String>, qubit_id: u32, gate_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            qubit_id,
            gate_id: gate_id.into(),
        }
    }

    /// Prefix selecting every gate of a device.
    pub fn device_prefix(device_id: &str) -> Vec<KeyPart> {
        vec![KeyPart::from(device_id)]
    }

    /// Prefix selecting every gate of one qubit.
    pub fn qubit_prefix(device_id: &str, qubit_id: u32) -> Vec<KeyPart> {
        vec![KeyPart::from(device_id), KeyPart::from(qubit_id)]
    }
}

impl VersionKey for GateKey {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("device_id", "TEXT"),
        ("qubit_id", "INTEGER"),
        ("gate_id", "TEXT"),
    ];

    fn values(&self) -> Vec<KeyPart> {
        vec![
            KeyPart::from(self.device_id.clone()),
            KeyPart::from(self.qubit_id),
            KeyPart::from(self.gate_id.clone()),
        ]
    }
}

/// Measured control-pulse parameters for one gate, such as `"+X"`.
/// Each measurement is independently optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Device this gate belongs to.
    pub device_id: String,
    /// Qubit this gate acts on.
    pub qubit_id: u32,
    /// Short name uniquely identifying the gate on its qubit.
    pub gate_id: String,
    /// Amplitude of the control pulse in mV.
    pub amplitude: Option<f64>,
    /// Width of the control pulse in ns.
    pub width: Option<f64>,
    /// Phase of the control pulse in radians.
    pub phase: Option<f64>,
}

impl Gate {
    /// Create a gate record with no measurements set.
    pub fn new(
        device_id: impl Into<String>,
        qubit_id: u32,
        gate_id: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            qubit_id,
            gate_id: gate_id.into(),
            amplitude: None,
            width: None,
            phase: None,
        }
    }

    /// Set the pulse amplitude in mV.
    pub fn with_amplitude(mut self, mv: f64) -> Self {
        self.amplitude = Some(mv);
        self
    }

    /// Set the pulse width in ns.
    pub fn with_width(mut self, ns: f64) -> Self {
        self.width = Some(ns);
        self
    }

    /// Set the pulse phase in radians.
    pub fn with_phase(mut self, radians: f64) -> Self {
        self.phase = Some(radians);
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
        if self.gate_id.is_empty() {
            return Err(LedgerError::Validation {
                field: "gate_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl VersionRecord for Gate {
    type Key = GateKey;

    const TABLE: &'static str = "gates";

    fn key(&self) -> GateKey {
        GateKey::new(self.device_id.clone(), self.qubit_id, self.gate_id.clone())
    }
}
