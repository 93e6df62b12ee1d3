//! Management Information Base for the KeyShare agent.
//!
//! - **MibStore**: thread-safe, insertion-ordered scalar block plus the
//!   generated-keys table, with access control and typed writes
//! - **KeyTable**: rows keyed by id with a separate insertion-order index,
//!   so a row is always inserted or removed as one unit
//! - **Snapshot**: rmp-serde persistence of the whole MIB across restarts

pub mod snapshot;
pub mod store;
pub mod table;

pub use snapshot::{load_snapshot, save_snapshot, MibSnapshot, SnapshotError};
pub use store::{MibStore, ScalarDefaults};
pub use table::{KeyRow, KeyTable};
