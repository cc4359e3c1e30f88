//! Unit conversion and source image size lookup.
//!
//! File access goes through the [`FileSource`] trait so that callers (and
//! tests) can substitute the filesystem without process-wide patching.

use std::fmt::Debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use vollite_shared::constants::units::GIB;
use vollite_shared::errors::{VolliteError, VolliteResult};

/// Convert gibibytes to bytes (`gib * 2^30`), exact.
///
/// Callers validate that `gib` does not exceed
/// [`MAX_CAPACITY_GIB`](vollite_shared::constants::units::MAX_CAPACITY_GIB).
pub const fn gib_to_bytes(gib: u64) -> u64 {
    gib * GIB
}

/// Stat and read access to source images.
pub trait FileSource: Send + Sync + Debug {
    /// Byte length of the file at `path`.
    ///
    /// Fails with [`VolliteError::NotFound`] if the path does not resolve.
    fn size(&self, path: &Path) -> VolliteResult<u64>;

    /// Open the file at `path` for streaming.
    ///
    /// The returned reader is released when dropped.
    fn open(&self, path: &Path) -> VolliteResult<Box<dyn Read + Send>>;
}

/// [`FileSource`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl FileSource for LocalFiles {
    fn size(&self, path: &Path) -> VolliteResult<u64> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| VolliteError::from_io(format!("stat {}", path.display()), e))?;

        if !metadata.is_file() {
            return Err(VolliteError::NotFound(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(metadata.len())
    }

    fn open(&self, path: &Path) -> VolliteResult<Box<dyn Read + Send>> {
        let file = File::open(path)
            .map_err(|e| VolliteError::from_io(format!("open {}", path.display()), e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Byte length of a source image, as reported by `files`.
pub fn file_size_bytes(files: &dyn FileSource, path: &Path) -> VolliteResult<u64> {
    files.size(path)
}
