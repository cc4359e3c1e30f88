use std::sync::Arc;

use vollite_shared::Permissions;
use vollite_shared::errors::VolliteResult;

use super::options::{Namespace, VolumeOptions};
use super::volume_impl::Volume;
use crate::hypervisor::StoragePool;
use crate::units::{FileSource, LocalFiles};

/// Collaborators shared by the volumes of one node: the pool they live in,
/// how source images are read, and how their names are scoped.
#[derive(Debug)]
pub struct StorageContext {
    namespace: Namespace,
    pool: Arc<dyn StoragePool>,
    files: Arc<dyn FileSource>,
    permissions: Permissions,
}

impl StorageContext {
    /// Create a context reading source images from the local filesystem.
    pub fn new(namespace: Namespace, pool: Arc<dyn StoragePool>) -> Self {
        Self {
            namespace,
            pool,
            files: Arc::new(LocalFiles),
            permissions: Permissions::default(),
        }
    }

    pub fn with_file_source(mut self, files: Arc<dyn FileSource>) -> Self {
        self.files = files;
        self
    }

    /// Permissions written into the descriptors of new volumes.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn pool(&self) -> &dyn StoragePool {
        self.pool.as_ref()
    }

    pub fn files(&self) -> &dyn FileSource {
        self.files.as_ref()
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Declare a volume in this context. Nothing is created until
    /// [`Volume::define`] is called.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `options` fails validation.
    pub fn add_volume(self: &Arc<Self>, options: VolumeOptions) -> VolliteResult<Volume> {
        options.validate()?;
        Ok(Volume::new(Arc::clone(self), options))
    }
}
