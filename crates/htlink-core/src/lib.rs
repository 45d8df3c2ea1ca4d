// htlink-core: polling coordinator between htlink-proto and consumers (CLI,
// home-automation bridges).

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod health;
pub mod store;
pub mod stream;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{
    Access, Catalog, Category, DataKind, Limits, OPERATING_MODES, ParameterDescriptor, QueryClass,
};
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::{CatalogError, CoreError, WriteRejection};
pub use gate::WriteGate;
pub use health::Health;
pub use store::{ParameterSnapshot, SnapshotEntry, SnapshotStore, Validity};
pub use stream::{SnapshotStream, SnapshotWatchStream};
pub use value::{Choice, ParamValue};

pub use htlink_proto::{DeviceClock, SessionStateKind, TcpConnector};
