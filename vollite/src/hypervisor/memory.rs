//! In-process storage pool.
//!
//! Volumes exist only as descriptors in a shared map; uploaded bytes are
//! drained and accounted for but not retained. Target paths follow
//! `/<pool-name>/<volume-name>`.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use vollite_shared::VolumeDescriptor;
use vollite_shared::errors::{VolliteError, VolliteResult};

use super::{StoragePool, VolumeHandle, VolumeInfo};

/// In-memory [`StoragePool`].
///
/// Cloning yields another handle to the same pool.
#[derive(Clone, Debug)]
pub struct MemoryPool {
    inner: Arc<MemoryPoolInner>,
}

#[derive(Debug)]
struct MemoryPoolInner {
    name: String,
    volumes: RwLock<HashMap<String, VolumeDescriptor>>,
}

impl MemoryPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryPoolInner {
                name: name.into(),
                volumes: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Number of volumes currently held.
    pub fn len(&self) -> usize {
        self.inner.volumes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoragePool for MemoryPool {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn volume_path(&self, name: &str) -> PathBuf {
        PathBuf::from("/").join(&self.inner.name).join(name)
    }

    fn define_volume(&self, descriptor: &VolumeDescriptor) -> VolliteResult<Box<dyn VolumeHandle>> {
        let mut volumes = self.inner.volumes.write();

        if volumes.contains_key(&descriptor.key) {
            return Err(VolliteError::AlreadyDefined(format!(
                "volume '{}' already exists in pool '{}'",
                descriptor.name, self.inner.name
            )));
        }

        if let Some(backing) = &descriptor.backing_store {
            if !descriptor.format().supports_backing_store() {
                return Err(VolliteError::InvalidConfiguration(format!(
                    "volume '{}' has format {} which cannot reference a backing store",
                    descriptor.name,
                    descriptor.format()
                )));
            }
            let present = volumes.values().any(|v| v.target.path == backing.path);
            if !present {
                return Err(VolliteError::NotFound(format!(
                    "backing store {} of volume '{}' not found in pool '{}'",
                    backing.path.display(),
                    descriptor.name,
                    self.inner.name
                )));
            }
        }

        volumes.insert(descriptor.key.clone(), descriptor.clone());
        tracing::debug!(
            pool = %self.inner.name,
            volume = %descriptor.name,
            capacity = descriptor.capacity,
            "Defined in-memory volume"
        );

        Ok(Box::new(MemoryVolume {
            key: descriptor.key.clone(),
            pool: Arc::clone(&self.inner),
        }))
    }

    fn lookup_volume(&self, key: &str) -> VolliteResult<Box<dyn VolumeHandle>> {
        if !self.inner.volumes.read().contains_key(key) {
            return Err(self.inner.not_found(key));
        }
        Ok(Box::new(MemoryVolume {
            key: key.to_string(),
            pool: Arc::clone(&self.inner),
        }))
    }
}

impl MemoryPoolInner {
    fn not_found(&self, key: &str) -> VolliteError {
        VolliteError::NotFound(format!("volume {} in pool '{}'", key, self.name))
    }
}

#[derive(Debug)]
struct MemoryVolume {
    key: String,
    pool: Arc<MemoryPoolInner>,
}

impl MemoryVolume {
    fn read<T>(&self, f: impl FnOnce(&VolumeDescriptor) -> T) -> VolliteResult<T> {
        let volumes = self.pool.volumes.read();
        let descriptor = volumes
            .get(&self.key)
            .ok_or_else(|| self.pool.not_found(&self.key))?;
        Ok(f(descriptor))
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut VolumeDescriptor) -> VolliteResult<T>,
    ) -> VolliteResult<T> {
        let mut volumes = self.pool.volumes.write();
        let descriptor = volumes
            .get_mut(&self.key)
            .ok_or_else(|| self.pool.not_found(&self.key))?;
        f(descriptor)
    }
}

impl VolumeHandle for MemoryVolume {
    fn key(&self) -> &str {
        &self.key
    }

    fn info(&self) -> VolliteResult<VolumeInfo> {
        self.read(|d| VolumeInfo {
            capacity: d.capacity,
            allocation: d.allocation,
        })
    }

    fn descriptor(&self) -> VolliteResult<VolumeDescriptor> {
        self.read(|d| d.clone())
    }

    fn resize(&self, capacity: u64) -> VolliteResult<()> {
        self.update(|d| {
            if capacity < d.capacity {
                return Err(VolliteError::Storage(format!(
                    "cannot shrink volume '{}' from {} to {} bytes",
                    d.name, d.capacity, capacity
                )));
            }
            d.capacity = capacity;
            d.allocation = d.allocation.max(capacity);
            Ok(())
        })
    }

    fn upload(&self, stream: &mut dyn Read, offset: u64, length: u64) -> VolliteResult<()> {
        let end = offset.checked_add(length).ok_or_else(|| {
            VolliteError::Storage(format!("upload range overflows at offset {}", offset))
        })?;

        let capacity = self.read(|d| d.capacity)?;
        if end > capacity {
            return Err(VolliteError::Storage(format!(
                "upload of {} bytes at offset {} exceeds capacity {} of {}",
                length, offset, capacity, self.key
            )));
        }

        // The stream may legitimately be shorter than `length` here;
        // content is not retained.
        let received = io::copy(&mut stream.take(length), &mut io::sink())
            .map_err(|e| VolliteError::Storage(format!("read upload stream: {}", e)))?;

        self.update(|d| {
            d.allocation = d.allocation.max(end);
            Ok(())
        })?;

        tracing::debug!(key = %self.key, offset, length, received, "Uploaded to in-memory volume");
        Ok(())
    }

    fn delete(&self) -> VolliteResult<()> {
        self.pool
            .volumes
            .write()
            .remove(&self.key)
            .map(|_| ())
            .ok_or_else(|| self.pool.not_found(&self.key))
    }
}
