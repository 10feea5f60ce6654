//! Postgres persistence for the inventory pipeline: connection pooling,
//! schema migrations, and per-table repositories for systems, inventory
//! records, diffs, applications, and alerts (spec §3).

pub mod migration;
pub mod models;
pub mod pool;
pub mod repository;

pub use migration::{create_initial_migrations, Migration, Migrator};
pub use models::{
    ApplicationRow, InventoryAlertRow, InventoryDiffRow, InventoryRecordRow, SystemRow,
};
pub use pool::{DatabasePool, PoolConfig};
pub use repository::{
    AlertRepository, ApplicationRepository, DiffRepository, InventoryRepository, NewDiff,
    SystemRepository,
};
