//! Point-in-time device summaries.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::gate::Gate;
use crate::qubit::Qubit;

/// Read-only projection of a device and everything visible on it at one
/// instant. Built by [`DeviceLedger`](crate::ledger::DeviceLedger); never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Unique device id such as `"7-qubit-prototype"`.
    pub device_id: String,
    /// Optional short description of the device.
    pub description: Option<String>,
    /// Visible qubits, sorted ascending by qubit id.
    pub qubits: Vec<Qubit>,
    /// Visible gates per qubit id, each group sorted by gate id. Every
    /// visible qubit has an entry, possibly empty; gates whose qubit is
    /// not visible are excluded.
    pub gates: BTreeMap<u32, Vec<Gate>>,
}

impl DeviceSummary {
    /// Compose a summary from independently queried parts. Qubits are
    /// sorted by id; a gate is kept only when its qubit is in the visible
    /// set, so gates of archived (or never-saved) qubits drop out here
    /// even when the gate record itself is live.
    pub(crate) fn compose(device: Device, mut qubits: Vec<Qubit>, gates: Vec<Gate>) -> Self {
        qubits.sort_by_key(|q| q.qubit_id);

        let visible: FxHashSet<u32> = qubits.iter().map(|q| q.qubit_id).collect();
        let mut gate_map: BTreeMap<u32, Vec<Gate>> =
            qubits.iter().map(|q| (q.qubit_id, Vec::new())).collect();
        for gate in gates {
            if visible.contains(&gate.qubit_id) {
                gate_map.entry(gate.qubit_id).or_default().push(gate);
            }
        }
        for group in gate_map.values_mut() {
            group.sort_by(|a, b| a.gate_id.cmp(&b.gate_id));
        }

        Self {
            device_id: device.device_id,
            description: device.description,
            qubits,
            gates: gate_map,
        }
    }

    /// The visible qubit with this id, if any.
    pub fn qubit(&self, qubit_id: u32) -> Option<&Qubit> {
        self.qubits.iter().find(|q| q.qubit_id == qubit_id)
    }

    /// The visible gates of one qubit, or `None` if the qubit itself is
    /// not visible.
    pub fn gates_for(&self, qubit_id: u32) -> Option<&[Gate]> {
        self.gates.get(&qubit_id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new("alpha", Some("test device".to_string()))
    }

    #[test]
    fn test_compose_sorts_qubits_and_gates() {
        let qubits = vec![Qubit::new("alpha", 2), Qubit::new("alpha", 0)];
        let gates = vec![
            Gate::new("alpha", 0, "+Y"),
            Gate::new("alpha", 0, "+X"),
            Gate::new("alpha", 2, "-X"),
        ];

        let summary = DeviceSummary::compose(device(), qubits, gates);
        let ids: Vec<u32> = summary.qubits.iter().map(|q| q.qubit_id).collect();
        assert_eq!(ids, vec![0, 2]);

        let gate_ids: Vec<&str> = summary.gates_for(0).unwrap().iter().map(|g| g.gate_id.as_str()).collect();
        assert_eq!(gate_ids, vec!["+X", "+Y"]);
        assert_eq!(summary.gates_for(2).unwrap().len(), 1);
    }

    #[test]
    fn test_compose_drops_orphaned_gates() {
        // Qubit 1 is not visible; its gate must not appear anywhere.
        let qubits = vec![Qubit::new("alpha", 0)];
        let gates = vec![Gate::new("alpha", 0, "+X"), Gate::new("alpha", 1, "+X")];

        let summary = DeviceSummary::compose(device(), qubits, gates);
        assert_eq!(summary.gates.len(), 1);
        assert_eq!(summary.gates_for(0).unwrap().len(), 1);
        assert!(summary.gates_for(1).is_none());
    }

    #[test]
    fn test_visible_qubit_without_gates_has_empty_entry() {
        let qubits = vec![Qubit::new("alpha", 0), Qubit::new("alpha", 1)];
        let gates = vec![Gate::new("alpha", 0, "+X")];

        let summary = DeviceSummary::compose(device(), qubits, gates);
        assert_eq!(summary.gates_for(1), Some(&[] as &[Gate]));
        assert!(summary.qubit(1).is_some());
        assert!(summary.qubit(7).is_none());
    }
}
