//! Test doubles for vollite integration tests.
//!
//! - [`RecordingPool`] wraps a pool and records every primitive call made
//!   through it, optionally failing resize or upload.
//! - [`FakeFiles`] serves source images whose reported size is independent
//!   of their content, and counts open readers.

mod files;
mod pool;

pub use files::FakeFiles;
pub use pool::{PoolCall, RecordingPool};

use std::sync::Arc;

use vollite::{MemoryPool, Namespace, StorageContext};

/// Context for the `test_env`/`test_node` namespace over a recording
/// in-memory pool called `default-pool`.
pub fn test_context(files: &FakeFiles) -> (Arc<StorageContext>, RecordingPool) {
    let pool = RecordingPool::new(MemoryPool::new("default-pool"));
    let context = StorageContext::new(
        Namespace::new("test_env").with_node("test_node"),
        Arc::new(pool.clone()),
    )
    .with_file_source(Arc::new(files.clone()));
    (Arc::new(context), pool)
}
