//! VolLite - virtual storage volumes for test-environment virtual machines.
//!
//! A [`Volume`] is declared either as a blank volume with an explicit
//! capacity (GiB) or as a volume seeded from a source disk image. Defining
//! it hands a [`VolumeDescriptor`] to a [`StoragePool`]; afterwards its
//! capacity, allocation, path and format are read back from the pool.
//! Copy-on-write children share their parent's image through a backing
//! store reference, and [`Volume::upload`] streams image content into a
//! volume, growing it first when the image is larger than the current
//! allocation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vollite::{MemoryPool, Namespace, StorageContext, VolumeOptions};
//!
//! let pool = Arc::new(MemoryPool::new("default-pool"));
//! let node = Arc::new(StorageContext::new(
//!     Namespace::new("test_env").with_node("test_node"),
//!     pool,
//! ));
//!
//! let mut volume = node.add_volume(VolumeOptions::builder("system").capacity(512).build())?;
//! volume.define()?;
//! assert_eq!(volume.get_capacity()?, 512 << 30);
//!
//! let mut child = volume.create_child("system_child")?;
//! child.define()?;
//! # Ok::<(), vollite::VolliteError>(())
//! ```

pub mod disk;
pub mod hypervisor;
pub mod runtime;
pub mod units;
pub mod util;
pub mod volume;

pub use vollite_shared::errors::{VolliteError, VolliteResult};
pub use vollite_shared::{BackingStoreTarget, Permissions, VolumeDescriptor, VolumeFormat};

pub use hypervisor::{
    DirPool, MemoryPool, StoragePool, VolumeHandle, VolumeInfo, open_pool,
};
pub use runtime::options::{PoolBackend, PoolOptions, VolliteOptions};
pub use units::{FileSource, LocalFiles, file_size_bytes, gib_to_bytes};
pub use volume::{
    BackingStore, Namespace, StorageContext, Volume, VolumeOptions, VolumeOptionsBuilder,
    VolumeStatus,
};
