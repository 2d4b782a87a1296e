//! Inventory Domain
//!
//! Entities and algorithms for cloud resource discovery: accounts, clusters,
//! instances, tags and expenses, the tag-grammar resolver that derives
//! cluster identity, the quorum-based cluster status machine, and the write
//! contract a persistence layer implements.
//!
//! # Data flow
//!
//! ```text
//! discovered instance tags ──► tags::resolve ──► TagResolution
//!                                                     │
//! Instance ──► Account::add_instance ◄────────────────┘
//!                  │ (creates or appends to the derived cluster)
//!                  ▼
//!             Cluster::add_instance ──► status recomputation
//!                  │
//!                  ▼
//!             Inventory snapshot ──► InventoryStore::persist_snapshot
//! ```
//!
//! Cluster status is a pure function of final membership: it does not depend
//! on the order instances were discovered in.

pub mod error;
pub mod models;
pub mod repository;
pub mod tags;

// Re-export commonly used types
pub use error::{InventoryError, InventoryResult};
pub use models::{
    Account, CloudProvider, Cluster, ClusterStatus, Expense, Instance, InstanceStatus, Inventory,
    PowerTarget, Tag, STATUS_QUORUM, UNKNOWN_CONSOLE,
};
pub use repository::{InMemoryInventoryStore, InventoryStore, PersistSummary};
pub use tags::{TagResolution, CLUSTER_TAG_MARKER, UNKNOWN_CLUSTER_ID, UNKNOWN_CLUSTER_NAME};
