//! qledger: append-only versioned storage for quantum device calibration
//! data.
//!
//! Calibration measurements drift, get re-taken, and occasionally get
//! recorded wrong; qledger keeps all of it. Every save of a qubit or gate
//! record appends a new immutable version, deletes append tombstones, and
//! any past state can be reconstructed with an as-of query against the
//! returned timestamps.
//!
//! # Overview
//!
//! - [`DeviceLedger`] is the entry point: guarded writes (a qubit needs a
//!   live device, a gate needs a live qubit) and composite reads that
//!   assemble a [`DeviceSummary`] from the device registry and the two
//!   version logs.
//! - [`SqliteVersionLog`] is the generic append-only engine behind the
//!   qubit and gate logs, exposed through the [`VersionLog`] trait for
//!   callers that want to store their own [`VersionRecord`] types.
//! - [`Clock`] stamps every write with a strictly increasing timestamp;
//!   [`MonotonicClock`] is the wall-seeded production implementation and
//!   [`ManualClock`] the deterministic one for tests.
//!
//! # Example
//!
//! ```ignore
//! use qledger::{DeviceLedger, Gate, Qubit};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = DeviceLedger::open("calibration.db")?;
//!
//!     ledger.create_device("sample", Some("Sample device")).await?;
//!     ledger.save_qubit(&Qubit::new("sample", 0).with_t1(23.4)).await?;
//!     let before_gate = ledger
//!         .save_gate(&Gate::new("sample", 0, "+X").with_amplitude(120.0))
//!         .await?;
//!
//!     // Current state of the whole device.
//!     let summary = ledger.device("sample").await?;
//!     println!("{} qubits", summary.qubits.len());
//!
//!     // The device as it looked just before the gate was saved.
//!     let snapshot = ledger.snapshot("sample", before_gate).await?;
//!     assert!(snapshot.gates_for(0).unwrap().is_empty());
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod device;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod qubit;
pub mod store;
pub mod summary;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use device::{Device, DeviceRegistry, SqliteDeviceRegistry};
pub use error::{LedgerError, LedgerResult};
pub use gate::{Gate, GateKey};
pub use ledger::DeviceLedger;
pub use qubit::{Qubit, QubitKey};
pub use store::{KeyPart, SqliteVersionLog, VersionKey, VersionLog, VersionRecord};
pub use summary::DeviceSummary;
