//! The volume entity.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vollite_shared::errors::{VolliteError, VolliteResult};
use vollite_shared::{BackingStoreTarget, Permissions, VolumeDescriptor, VolumeFormat};

use super::context::StorageContext;
use super::options::VolumeOptions;
use super::state::VolumeStatus;
use super::upload;
use crate::hypervisor::VolumeHandle;
use crate::units::{file_size_bytes, gib_to_bytes};

/// Parent of a copy-on-write child, captured when the child was created.
///
/// Held by value: the child stays valid after the parent [`Volume`] is
/// dropped, since the pool records the relationship by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackingStore {
    /// Hypervisor-side name of the parent.
    pub name: String,
    pub path: PathBuf,
    pub format: VolumeFormat,
    pub permissions: Permissions,
    /// Parent capacity in bytes at snapshot time.
    pub capacity_bytes: u64,
    /// Parent's declared capacity in GiB.
    pub capacity: Option<u64>,
}

impl BackingStore {
    fn target(&self) -> BackingStoreTarget {
        BackingStoreTarget {
            path: self.path.clone(),
            format: self.format,
            permissions: self.permissions,
        }
    }
}

#[derive(Clone, Debug)]
enum Sizing {
    Blank { capacity_gib: u64 },
    Image { source: PathBuf },
    Child(BackingStore),
}

/// Sizing resolved at define time.
struct Resolved<'a> {
    capacity_bytes: u64,
    seed: Option<&'a Path>,
    backing: Option<BackingStoreTarget>,
}

/// A storage volume declared for a node.
///
/// Created through [`StorageContext::add_volume`] or
/// [`Volume::create_child`]; storage exists in the pool only between
/// [`define`](Self::define) and [`erase`](Self::erase).
pub struct Volume {
    context: Arc<StorageContext>,
    name: String,
    full_name: String,
    format: VolumeFormat,
    sizing: Sizing,
    status: VolumeStatus,
    handle: Option<Box<dyn VolumeHandle>>,
}

impl Volume {
    pub(crate) fn new(context: Arc<StorageContext>, options: VolumeOptions) -> Self {
        let sizing = match (options.capacity, options.source_image) {
            (_, Some(source)) => Sizing::Image { source },
            (Some(capacity_gib), None) => Sizing::Blank { capacity_gib },
            // Rejected by VolumeOptions::validate()
            (None, None) => Sizing::Blank { capacity_gib: 0 },
        };
        Self::with_sizing(context, options.name, options.format, sizing)
    }

    fn with_sizing(
        context: Arc<StorageContext>,
        name: String,
        format: VolumeFormat,
        sizing: Sizing,
    ) -> Self {
        let full_name = context.namespace().volume_name(&name);
        Self {
            context,
            name,
            full_name,
            format,
            sizing,
            status: VolumeStatus::Undefined,
            handle: None,
        }
    }

    /// Name within the owning node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the volume in the hypervisor's pool.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn status(&self) -> VolumeStatus {
        self.status
    }

    /// Declared capacity in GiB.
    ///
    /// `None` for volumes sized from a source image. Children report their
    /// parent's declared capacity. Never changed by [`upload`](Self::upload).
    pub fn capacity(&self) -> Option<u64> {
        match &self.sizing {
            Sizing::Blank { capacity_gib } => Some(*capacity_gib),
            Sizing::Image { .. } => None,
            Sizing::Child(parent) => parent.capacity,
        }
    }

    pub fn source_image(&self) -> Option<&Path> {
        match &self.sizing {
            Sizing::Image { source } => Some(source),
            _ => None,
        }
    }

    pub fn backing_store(&self) -> Option<&BackingStore> {
        match &self.sizing {
            Sizing::Child(parent) => Some(parent),
            _ => None,
        }
    }

    /// Materialize the volume in the pool.
    ///
    /// A volume with a source image is sized from the image and seeded with
    /// its content. If seeding fails the created storage is removed again
    /// and the volume keeps its previous status.
    ///
    /// # Errors
    ///
    /// - `AlreadyDefined` if the volume is already defined, or the pool holds
    ///   a volume with the same key
    /// - `NotFound` if the source image or backing store is missing
    /// - `InvalidConfiguration` if the source image is empty
    /// - `Transfer` if seeding from the source image fails
    pub fn define(&mut self) -> VolliteResult<()> {
        if !self.status.can_define() {
            return Err(VolliteError::AlreadyDefined(format!(
                "volume '{}' is {}",
                self.full_name, self.status
            )));
        }

        let resolved = self.resolve()?;
        let descriptor = self.descriptor(&resolved);
        tracing::debug!(volume = %self.full_name, xml = %descriptor.to_xml(), "Defining volume");

        let handle = self.context.pool().define_volume(&descriptor)?;

        if let Some(source) = resolved.seed
            && let Err(e) = upload::upload(handle.as_ref(), self.context.files(), source)
        {
            if let Err(cleanup) = handle.delete() {
                tracing::warn!(
                    volume = %self.full_name,
                    "Failed to remove volume after seeding failure: {}",
                    cleanup
                );
            }
            return Err(e);
        }

        self.status = VolumeStatus::Defined;
        self.handle = Some(handle);
        tracing::info!(
            volume = %self.full_name,
            path = %descriptor.path().display(),
            bytes = descriptor.capacity,
            "Defined volume"
        );
        Ok(())
    }

    /// Whether the pool currently holds this volume's storage.
    pub fn exists(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.info().is_ok(),
            None => self.context.pool().lookup_volume(&self.key()).is_ok(),
        }
    }

    /// Destroy the volume's storage.
    ///
    /// # Errors
    ///
    /// `NotFound` if the pool holds no such volume, or this volume was
    /// already erased.
    pub fn erase(&mut self) -> VolliteResult<()> {
        if !self.status.can_transition_to(VolumeStatus::Erased) {
            return Err(VolliteError::NotFound(format!(
                "volume '{}' is already erased",
                self.full_name
            )));
        }

        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => self.context.pool().lookup_volume(&self.key())?,
        };

        if let Err(e) = handle.delete() {
            if e.is_not_found() {
                self.status = VolumeStatus::Erased;
            } else if self.status.is_defined() {
                self.handle = Some(handle);
            }
            return Err(e);
        }

        self.status = VolumeStatus::Erased;
        tracing::info!(volume = %self.full_name, "Erased volume");
        Ok(())
    }

    /// Capacity in bytes as reported by the pool.
    pub fn get_capacity(&self) -> VolliteResult<u64> {
        Ok(self.handle()?.info()?.capacity)
    }

    /// Allocation in bytes as reported by the pool.
    pub fn get_allocation(&self) -> VolliteResult<u64> {
        Ok(self.handle()?.info()?.allocation)
    }

    pub fn get_path(&self) -> VolliteResult<PathBuf> {
        Ok(self.handle()?.descriptor()?.target.path)
    }

    pub fn get_format(&self) -> VolliteResult<VolumeFormat> {
        Ok(self.handle()?.descriptor()?.format())
    }

    /// Descriptor XML as currently known to the pool.
    pub fn xml_desc(&self) -> VolliteResult<String> {
        self.handle()?.xml_desc()
    }

    /// Declare a copy-on-write child backed by this volume.
    ///
    /// The child inherits this volume's path, format and permissions as its
    /// backing store and this volume's current capacity. It still has to be
    /// defined.
    ///
    /// # Errors
    ///
    /// - `NotDefined` if this volume is not defined
    /// - `InvalidConfiguration` if `name` is this volume's own name
    pub fn create_child(&self, name: impl Into<String>) -> VolliteResult<Volume> {
        let name = name.into();
        let descriptor = self.handle()?.descriptor()?;

        if name == self.name {
            return Err(VolliteError::InvalidConfiguration(format!(
                "child of '{}' cannot reuse its parent's name",
                self.full_name
            )));
        }

        let parent = BackingStore {
            name: self.full_name.clone(),
            path: descriptor.target.path,
            format: descriptor.target.format,
            permissions: descriptor.target.permissions,
            capacity_bytes: descriptor.capacity,
            capacity: self.capacity(),
        };

        Ok(Self::with_sizing(
            Arc::clone(&self.context),
            name,
            parent.format,
            Sizing::Child(parent),
        ))
    }

    /// Push the content of the local file at `source` into this volume,
    /// growing it first if the file is larger than the current allocation.
    ///
    /// # Errors
    ///
    /// - `NotDefined` if the volume is not defined
    /// - `NotFound` if `source` cannot be read
    /// - `Transfer` if the resize or upload primitive fails
    pub fn upload(&self, source: impl AsRef<Path>) -> VolliteResult<()> {
        upload::upload(self.handle()?, self.context.files(), source.as_ref()).map(|_| ())
    }

    fn handle(&self) -> VolliteResult<&dyn VolumeHandle> {
        match &self.handle {
            Some(handle) if self.status.is_defined() => Ok(handle.as_ref()),
            _ => Err(VolliteError::NotDefined(format!(
                "volume '{}' is {}",
                self.full_name, self.status
            ))),
        }
    }

    fn key(&self) -> String {
        self.context
            .pool()
            .volume_path(&self.full_name)
            .display()
            .to_string()
    }

    fn resolve(&self) -> VolliteResult<Resolved<'_>> {
        match &self.sizing {
            Sizing::Blank { capacity_gib } => Ok(Resolved {
                capacity_bytes: gib_to_bytes(*capacity_gib),
                seed: None,
                backing: None,
            }),
            Sizing::Image { source } => {
                let size = file_size_bytes(self.context.files(), source)?;
                if size == 0 {
                    return Err(VolliteError::InvalidConfiguration(format!(
                        "source image {} of volume '{}' is empty",
                        source.display(),
                        self.full_name
                    )));
                }
                Ok(Resolved {
                    capacity_bytes: size,
                    seed: Some(source),
                    backing: None,
                })
            }
            Sizing::Child(parent) => Ok(Resolved {
                capacity_bytes: parent.capacity_bytes,
                seed: None,
                backing: Some(parent.target()),
            }),
        }
    }

    fn descriptor(&self, resolved: &Resolved<'_>) -> VolumeDescriptor {
        let path = self.context.pool().volume_path(&self.full_name);
        VolumeDescriptor::new(&self.full_name, path)
            .with_capacity(resolved.capacity_bytes)
            .with_allocation(resolved.capacity_bytes)
            .with_format(self.format)
            .with_permissions(self.context.permissions())
            .with_backing_store(resolved.backing.clone())
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.full_name)
            .field("format", &self.format)
            .field("sizing", &self.sizing)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::MemoryPool;
    use crate::volume::options::Namespace;
    use std::io::Write;

    fn context() -> Arc<StorageContext> {
        Arc::new(StorageContext::new(
            Namespace::new("test_env").with_node("test_node"),
            Arc::new(MemoryPool::new("default-pool")),
        ))
    }

    fn blank(ctx: &Arc<StorageContext>, name: &str, gib: u64) -> Volume {
        ctx.add_volume(VolumeOptions::builder(name).capacity(gib).build())
            .unwrap()
    }

    #[test]
    fn test_define_blank() {
        let ctx = context();
        let mut volume = blank(&ctx, "test_volume", 512);
        assert_eq!(volume.status(), VolumeStatus::Undefined);
        assert!(!volume.exists());

        volume.define().unwrap();
        assert_eq!(volume.status(), VolumeStatus::Defined);
        assert!(volume.exists());
        assert_eq!(volume.capacity(), Some(512));
        assert_eq!(volume.get_capacity().unwrap(), 549755813888);
        assert_eq!(volume.get_allocation().unwrap(), 549755813888);
        assert_eq!(
            volume.get_path().unwrap(),
            PathBuf::from("/default-pool/test_env_test_node_test_volume")
        );
        assert_eq!(volume.get_format().unwrap(), VolumeFormat::Qcow2);
    }

    #[test]
    fn test_queries_require_definition() {
        let ctx = context();
        let mut volume = blank(&ctx, "test_volume", 1);

        assert!(matches!(volume.get_capacity(), Err(VolliteError::NotDefined(_))));
        assert!(matches!(volume.get_path(), Err(VolliteError::NotDefined(_))));
        assert!(matches!(volume.xml_desc(), Err(VolliteError::NotDefined(_))));
        assert!(matches!(
            volume.create_child("child"),
            Err(VolliteError::NotDefined(_))
        ));

        volume.define().unwrap();
        volume.erase().unwrap();
        assert!(matches!(volume.get_allocation(), Err(VolliteError::NotDefined(_))));
    }

    #[test]
    fn test_define_twice() {
        let ctx = context();
        let mut volume = blank(&ctx, "test_volume", 1);
        volume.define().unwrap();

        assert!(matches!(volume.define(), Err(VolliteError::AlreadyDefined(_))));
        assert_eq!(volume.status(), VolumeStatus::Defined);
    }

    #[test]
    fn test_redefine_after_erase() {
        let ctx = context();
        let mut volume = blank(&ctx, "test_volume", 1);
        volume.define().unwrap();
        volume.erase().unwrap();
        assert_eq!(volume.status(), VolumeStatus::Erased);
        assert!(!volume.exists());

        volume.define().unwrap();
        assert!(volume.exists());
        assert_eq!(volume.get_capacity().unwrap(), 1 << 30);
    }

    #[test]
    fn test_erase_missing() {
        let ctx = context();
        let mut volume = blank(&ctx, "test_volume", 1);
        assert!(volume.erase().unwrap_err().is_not_found());
        assert_eq!(volume.status(), VolumeStatus::Undefined);

        volume.define().unwrap();
        volume.erase().unwrap();
        assert!(volume.erase().unwrap_err().is_not_found());
    }

    #[test]
    fn test_child_snapshot() {
        let ctx = context();
        let mut parent = blank(&ctx, "test_volume", 2);
        parent.define().unwrap();

        let mut child = parent.create_child("test_child").unwrap();
        assert_eq!(child.full_name(), "test_env_test_node_test_child");
        assert_eq!(child.capacity(), Some(2));

        let backing = child.backing_store().unwrap();
        assert_eq!(backing.name, "test_env_test_node_test_volume");
        assert_eq!(backing.path, parent.get_path().unwrap());
        assert_eq!(backing.capacity_bytes, 2 << 30);

        drop(parent);
        child.define().unwrap();
        assert_eq!(child.get_capacity().unwrap(), 2 << 30);
        assert_ne!(child.get_path().unwrap(), backing_path(&child));
    }

    fn backing_path(volume: &Volume) -> PathBuf {
        volume.backing_store().unwrap().path.clone()
    }

    #[test]
    fn test_child_name_clash() {
        let ctx = context();
        let mut parent = blank(&ctx, "test_volume", 1);
        parent.define().unwrap();
        assert!(matches!(
            parent.create_child("test_volume"),
            Err(VolliteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_source_image_sizing() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"image_data").unwrap();
        image.flush().unwrap();

        let ctx = context();
        let mut volume = ctx
            .add_volume(
                VolumeOptions::builder("test_volume")
                    .source_image(image.path())
                    .build(),
            )
            .unwrap();
        assert_eq!(volume.source_image(), Some(image.path()));

        volume.define().unwrap();
        assert_eq!(volume.capacity(), None);
        assert_eq!(volume.get_capacity().unwrap(), 10);
    }

    #[test]
    fn test_empty_source_image_rejected() {
        let image = tempfile::NamedTempFile::new().unwrap();

        let ctx = context();
        let mut volume = ctx
            .add_volume(
                VolumeOptions::builder("test_volume")
                    .source_image(image.path())
                    .build(),
            )
            .unwrap();

        assert!(matches!(
            volume.define(),
            Err(VolliteError::InvalidConfiguration(_))
        ));
        assert_eq!(volume.status(), VolumeStatus::Undefined);
        assert!(!volume.exists());
    }
}
