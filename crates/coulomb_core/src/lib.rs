//! Coulomb core - battery-usage accounting engine.
//!
//! Attributes elapsed on-battery time and discrete event counts to causes
//! (screen, radio, per-app wakelocks, per-app network use, kernel
//! wakelocks) so downstream tooling can explain battery drain. The engine
//! is a pure bookkeeping core: event sources push `note_*` calls in, a
//! host process decides when to poll, persist and query.

pub mod arena;
pub mod bins;
pub mod clock;
pub mod codec;
pub mod counter;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod net;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod summary;
pub mod timer;
pub mod types;
pub mod uid;

pub use arena::{CounterId, PoolId, SamplingId, StopwatchId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{BatteryStats, Unpluggable};
pub use error::{CodecError, StoreError};
pub use kernel::KernelWakelockReader;
pub use net::{NetworkSource, NullNetwork, NullRadio, ProcNetReader, RadioUptimeSource, SysfsRadioUptime};
pub use status::EngineStatus;
pub use store::StatsStore;
pub use types::{StatsKind, WakeClass, GPS_SENSOR_HANDLE};
