//! Raw disk image management.

use std::fs::OpenOptions;
use std::path::Path;

use vollite_shared::errors::{VolliteError, VolliteResult};

/// Helper for raw (flat) disk images.
pub struct RawHelper;

impl RawHelper {
    /// Create a sparse raw image of `size_bytes`.
    pub fn create_disk(disk_path: &Path, size_bytes: u64) -> VolliteResult<()> {
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(disk_path)
            .map_err(|e| {
                VolliteError::Storage(format!(
                    "Failed to create disk file {}: {}",
                    disk_path.display(),
                    e
                ))
            })?;

        file.set_len(size_bytes).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to size raw disk {} to {} bytes: {}",
                disk_path.display(),
                size_bytes,
                e
            ))
        })?;

        tracing::info!(
            "Created raw disk: {} ({} bytes sparse)",
            disk_path.display(),
            size_bytes
        );
        Ok(())
    }

    /// Grow a raw image to `new_size` bytes.
    pub fn resize(disk_path: &Path, new_size: u64) -> VolliteResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(disk_path)
            .map_err(|e| VolliteError::from_io(format!("open {}", disk_path.display()), e))?;

        let current = file
            .metadata()
            .map_err(|e| VolliteError::from_io(format!("stat {}", disk_path.display()), e))?
            .len();
        if new_size < current {
            return Err(VolliteError::Storage(format!(
                "Refusing to shrink raw disk {} from {} to {} bytes",
                disk_path.display(),
                current,
                new_size
            )));
        }

        file.set_len(new_size).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to resize raw disk {} to {} bytes: {}",
                disk_path.display(),
                new_size,
                e
            ))
        })
    }
}
