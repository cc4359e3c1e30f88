use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use vollite::{FileSource, VolliteError, VolliteResult};

#[derive(Debug, Clone)]
struct FakeImage {
    size: u64,
    data: Vec<u8>,
}

/// In-memory [`FileSource`].
///
/// The reported size of an image is set independently of its content, so a
/// multi-gigabyte image can be served from a few bytes. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeFiles {
    images: Arc<RwLock<HashMap<PathBuf, FakeImage>>>,
    open: Arc<AtomicUsize>,
}

impl FakeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image at `path` that stats as `size` bytes and reads as `data`.
    pub fn with_image(self, path: impl Into<PathBuf>, size: u64, data: &[u8]) -> Self {
        self.images.write().insert(
            path.into(),
            FakeImage {
                size,
                data: data.to_vec(),
            },
        );
        self
    }

    /// Readers handed out by `open` and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn not_found(path: &Path) -> VolliteError {
        VolliteError::NotFound(format!("stat {}: No such file or directory", path.display()))
    }
}

impl FileSource for FakeFiles {
    fn size(&self, path: &Path) -> VolliteResult<u64> {
        self.images
            .read()
            .get(path)
            .map(|image| image.size)
            .ok_or_else(|| Self::not_found(path))
    }

    fn open(&self, path: &Path) -> VolliteResult<Box<dyn Read + Send>> {
        let data = self
            .images
            .read()
            .get(path)
            .map(|image| image.data.clone())
            .ok_or_else(|| Self::not_found(path))?;

        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedReader {
            data: io::Cursor::new(data),
            open: Arc::clone(&self.open),
        }))
    }
}

struct TrackedReader {
    data: io::Cursor<Vec<u8>>,
    open: Arc<AtomicUsize>,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
