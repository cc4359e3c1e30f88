//! Pool construction from configuration.

use std::sync::Arc;

use vollite_shared::errors::VolliteResult;

use super::{DirPool, MemoryPool, StoragePool};
use crate::runtime::options::{PoolBackend, PoolOptions, VolliteOptions};

/// Open the pool described by `options`.
///
/// A directory pool without an explicit path is placed under
/// `<home>/pools/<name>` and created if missing.
pub fn open_pool(
    options: &PoolOptions,
    runtime: &VolliteOptions,
) -> VolliteResult<Arc<dyn StoragePool>> {
    let pool: Arc<dyn StoragePool> = match &options.backend {
        PoolBackend::Memory => Arc::new(MemoryPool::new(&options.name)),
        PoolBackend::Dir { path } => {
            let root = path
                .clone()
                .unwrap_or_else(|| runtime.layout().pool_dir(&options.name));
            Arc::new(DirPool::open(&options.name, root)?)
        }
    };

    tracing::info!(pool = %options.name, backend = ?options.backend, "Opened storage pool");
    Ok(pool)
}
