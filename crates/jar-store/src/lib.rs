pub mod config;
pub mod error;
pub mod json_bridge;
pub mod memory_store;
pub mod schema;
pub mod store;

pub use config::{
    CONFIG_FILE, DATA_DIR_ENV, DB_FILE, JarConfig, OracleConfig, default_base_dir,
    resolve_base_dir,
};
pub use error::{Result, StoreError};
pub use memory_store::{DEFAULT_MAX_BYTES, MemoryStore, StagedWrite, StoreWriter, load_all};
pub use store::Store;
