use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use vollite::{
    StoragePool, VolliteError, VolliteResult, VolumeDescriptor, VolumeHandle, VolumeInfo,
};

/// A primitive call observed by [`RecordingPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCall {
    Define { key: String },
    Resize { key: String, capacity: u64 },
    Upload { key: String, offset: u64, length: u64 },
    Delete { key: String },
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Mutex<Vec<PoolCall>>,
    fail_resize: Mutex<Option<String>>,
    fail_upload: Mutex<Option<String>>,
}

impl Recorder {
    fn record(&self, call: PoolCall) {
        self.calls.lock().push(call);
    }
}

/// [`StoragePool`] wrapper recording define/resize/upload/delete calls.
///
/// Clones share the same record.
#[derive(Clone, Debug)]
pub struct RecordingPool {
    inner: Arc<dyn StoragePool>,
    recorder: Arc<Recorder>,
}

impl RecordingPool {
    pub fn new(inner: impl StoragePool + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn calls(&self) -> Vec<PoolCall> {
        self.recorder.calls.lock().clone()
    }

    /// Capacities passed to resize, in call order.
    pub fn resize_calls(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PoolCall::Resize { capacity, .. } => Some(capacity),
                _ => None,
            })
            .collect()
    }

    /// `(offset, length)` of each upload, in call order.
    pub fn upload_calls(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PoolCall::Upload { offset, length, .. } => Some((offset, length)),
                _ => None,
            })
            .collect()
    }

    pub fn delete_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PoolCall::Delete { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.recorder.calls.lock().clear();
    }

    /// Make every subsequent resize fail with a storage error.
    pub fn fail_resize(&self, message: impl Into<String>) {
        *self.recorder.fail_resize.lock() = Some(message.into());
    }

    /// Make every subsequent upload fail with a storage error.
    pub fn fail_upload(&self, message: impl Into<String>) {
        *self.recorder.fail_upload.lock() = Some(message.into());
    }

    fn wrap(&self, handle: Box<dyn VolumeHandle>) -> Box<dyn VolumeHandle> {
        Box::new(RecordingHandle {
            inner: handle,
            recorder: Arc::clone(&self.recorder),
        })
    }
}

impl StoragePool for RecordingPool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn volume_path(&self, name: &str) -> PathBuf {
        self.inner.volume_path(name)
    }

    fn define_volume(&self, descriptor: &VolumeDescriptor) -> VolliteResult<Box<dyn VolumeHandle>> {
        self.recorder.record(PoolCall::Define {
            key: descriptor.key.clone(),
        });
        let handle = self.inner.define_volume(descriptor)?;
        Ok(self.wrap(handle))
    }

    fn lookup_volume(&self, key: &str) -> VolliteResult<Box<dyn VolumeHandle>> {
        let handle = self.inner.lookup_volume(key)?;
        Ok(self.wrap(handle))
    }
}

#[derive(Debug)]
struct RecordingHandle {
    inner: Box<dyn VolumeHandle>,
    recorder: Arc<Recorder>,
}

impl VolumeHandle for RecordingHandle {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn info(&self) -> VolliteResult<VolumeInfo> {
        self.inner.info()
    }

    fn descriptor(&self) -> VolliteResult<VolumeDescriptor> {
        self.inner.descriptor()
    }

    fn resize(&self, capacity: u64) -> VolliteResult<()> {
        self.recorder.record(PoolCall::Resize {
            key: self.key().to_string(),
            capacity,
        });
        if let Some(message) = self.recorder.fail_resize.lock().clone() {
            return Err(VolliteError::Storage(message));
        }
        self.inner.resize(capacity)
    }

    fn upload(&self, stream: &mut dyn Read, offset: u64, length: u64) -> VolliteResult<()> {
        self.recorder.record(PoolCall::Upload {
            key: self.key().to_string(),
            offset,
            length,
        });
        if let Some(message) = self.recorder.fail_upload.lock().clone() {
            return Err(VolliteError::Storage(message));
        }
        self.inner.upload(stream, offset, length)
    }

    fn delete(&self) -> VolliteResult<()> {
        self.recorder.record(PoolCall::Delete {
            key: self.key().to_string(),
        });
        self.inner.delete()
    }
}
