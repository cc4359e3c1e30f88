//! Hypervisor storage boundary.
//!
//! The volume core talks to the hypervisor's storage layer only through
//! [`StoragePool`] and [`VolumeHandle`]. Two backends ship with the crate:
//! - [`MemoryPool`] - in-process pool, the equivalent of a hypervisor test connection
//! - [`DirPool`] - directory-backed pool storing one image file per volume

mod dir;
mod factory;
mod memory;

use std::fmt::Debug;
use std::io::Read;
use std::path::PathBuf;

use vollite_shared::VolumeDescriptor;
use vollite_shared::errors::VolliteResult;

pub use dir::DirPool;
pub use factory::open_pool;
pub use memory::MemoryPool;

/// Capacity and allocation of a volume as the hypervisor sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Virtual size in bytes.
    pub capacity: u64,
    /// Bytes consumed on the underlying storage.
    pub allocation: u64,
}

/// A storage pool that can materialize and look up volumes.
pub trait StoragePool: Send + Sync + Debug {
    /// Pool name.
    fn name(&self) -> &str;

    /// Target path a volume named `name` gets in this pool.
    fn volume_path(&self, name: &str) -> PathBuf;

    /// Create a volume from `descriptor`.
    ///
    /// # Errors
    ///
    /// - `AlreadyDefined` if a volume with the same key exists
    /// - `NotFound` if the descriptor references a backing store the pool does not hold
    fn define_volume(&self, descriptor: &VolumeDescriptor) -> VolliteResult<Box<dyn VolumeHandle>>;

    /// Look up a volume by key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such volume exists.
    fn lookup_volume(&self, key: &str) -> VolliteResult<Box<dyn VolumeHandle>>;
}

/// Handle to a volume held by a [`StoragePool`].
///
/// Every call reads or mutates live pool state; a handle whose volume has
/// been deleted fails with `NotFound`.
pub trait VolumeHandle: Send + Sync + Debug {
    fn key(&self) -> &str;

    fn info(&self) -> VolliteResult<VolumeInfo>;

    /// Descriptor as currently known to the pool.
    fn descriptor(&self) -> VolliteResult<VolumeDescriptor>;

    /// XML rendering of [`descriptor`](Self::descriptor).
    fn xml_desc(&self) -> VolliteResult<String> {
        Ok(self.descriptor()?.to_xml())
    }

    /// Grow the volume to `capacity` bytes. Shrinking is rejected.
    fn resize(&self, capacity: u64) -> VolliteResult<()>;

    /// Write `length` bytes read from `stream` at `offset`.
    fn upload(&self, stream: &mut dyn Read, offset: u64, length: u64) -> VolliteResult<()>;

    fn delete(&self) -> VolliteResult<()>;
}
