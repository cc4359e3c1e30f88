//! Directory-backed storage pool.
//!
//! Each volume is an image file `<root>/<name>`. The volume's descriptor,
//! including its current capacity and allocation, is kept beside it in
//! `<root>/.meta/<name>.json`.
//!
//! An upload starting at offset 0 replaces the whole image, so a qcow2
//! volume seeded from raw bytes (or a child overlay overwritten by its
//! upload) ends up holding exactly the uploaded content. Resizes follow
//! whatever is on disk, not the format the volume was defined with.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use vollite_shared::errors::{VolliteError, VolliteResult};
use vollite_shared::{VolumeDescriptor, VolumeFormat};

use super::{StoragePool, VolumeHandle, VolumeInfo};
use crate::disk::{Qcow2Helper, RawHelper};
use crate::runtime::layout::dirs::META_DIR;

/// [`StoragePool`] that stores volume images in a local directory.
#[derive(Clone, Debug)]
pub struct DirPool {
    name: String,
    root: PathBuf,
}

impl DirPool {
    /// Open (creating if needed) a pool rooted at `root`.
    pub fn open(name: impl Into<String>, root: impl Into<PathBuf>) -> VolliteResult<Self> {
        let name = name.into();
        let root = root.into();

        fs::create_dir_all(root.join(META_DIR)).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to create pool directory {}: {}",
                root.display(),
                e
            ))
        })?;

        tracing::debug!(pool = %name, root = %root.display(), "Opened directory pool");
        Ok(Self { name, root })
    }

    /// Pool root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn handle_for(&self, image: &Path) -> VolliteResult<DirVolume> {
        let file_name = image
            .file_name()
            .filter(|_| image.parent() == Some(self.root.as_path()))
            .ok_or_else(|| {
                VolliteError::InvalidConfiguration(format!(
                    "path {} is not inside pool '{}' ({})",
                    image.display(),
                    self.name,
                    self.root.display()
                ))
            })?;

        let mut meta_name = file_name.to_os_string();
        meta_name.push(".json");

        Ok(DirVolume {
            key: image.display().to_string(),
            image: image.to_path_buf(),
            meta: self.root.join(META_DIR).join(meta_name),
        })
    }

    fn create_image(&self, descriptor: &VolumeDescriptor) -> VolliteResult<()> {
        let path = descriptor.path();
        match (descriptor.format(), &descriptor.backing_store) {
            (VolumeFormat::Raw, None) => RawHelper::create_disk(path, descriptor.capacity),
            (VolumeFormat::Qcow2, None) => Qcow2Helper::create_disk(path, descriptor.capacity),
            (VolumeFormat::Qcow2, Some(backing)) => {
                if !backing.path.exists() {
                    return Err(VolliteError::NotFound(format!(
                        "backing store {} of volume '{}'",
                        backing.path.display(),
                        descriptor.name
                    )));
                }
                Qcow2Helper::create_cow_child_disk(
                    &backing.path,
                    backing.format,
                    path,
                    descriptor.capacity,
                )
            }
            (format, Some(_)) => Err(VolliteError::InvalidConfiguration(format!(
                "volume '{}' has format {} which cannot reference a backing store",
                descriptor.name, format
            ))),
        }
    }
}

impl StoragePool for DirPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn define_volume(&self, descriptor: &VolumeDescriptor) -> VolliteResult<Box<dyn VolumeHandle>> {
        let volume = self.handle_for(descriptor.path())?;

        if volume.image.exists() || volume.meta.exists() {
            return Err(VolliteError::AlreadyDefined(format!(
                "volume '{}' already exists in pool '{}'",
                descriptor.name, self.name
            )));
        }

        self.create_image(descriptor)?;

        if let Err(e) = volume.store(descriptor) {
            if let Err(cleanup) = fs::remove_file(&volume.image) {
                tracing::warn!(
                    "Failed to remove {} after metadata write failure: {}",
                    volume.image.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!(
            pool = %self.name,
            volume = %descriptor.name,
            path = %volume.image.display(),
            "Defined volume"
        );
        Ok(Box::new(volume))
    }

    fn lookup_volume(&self, key: &str) -> VolliteResult<Box<dyn VolumeHandle>> {
        let not_found = || VolliteError::NotFound(format!("volume {} in pool '{}'", key, self.name));

        let volume = self.handle_for(Path::new(key)).map_err(|_| not_found())?;
        if !volume.image.exists() || !volume.meta.exists() {
            return Err(not_found());
        }
        Ok(Box::new(volume))
    }
}

#[derive(Debug)]
struct DirVolume {
    key: String,
    image: PathBuf,
    meta: PathBuf,
}

impl DirVolume {
    fn load(&self) -> VolliteResult<VolumeDescriptor> {
        let raw = fs::read(&self.meta).map_err(|e| {
            VolliteError::from_io(format!("read metadata of volume {}", self.key), e)
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            VolliteError::Storage(format!(
                "Corrupt metadata {}: {}",
                self.meta.display(),
                e
            ))
        })
    }

    /// Write metadata through a temporary file so readers never see a partial document.
    fn store(&self, descriptor: &VolumeDescriptor) -> VolliteResult<()> {
        let json = serde_json::to_vec_pretty(descriptor).map_err(|e| {
            VolliteError::Internal(format!("serialize metadata of {}: {}", self.key, e))
        })?;

        let tmp = self.meta.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.meta))
            .map_err(|e| {
                VolliteError::Storage(format!(
                    "Failed to write metadata {}: {}",
                    self.meta.display(),
                    e
                ))
            })
    }

    fn write_err(&self, length: u64, e: io::Error) -> VolliteError {
        VolliteError::Storage(format!(
            "Failed to write {} bytes to {}: {}",
            length,
            self.image.display(),
            e
        ))
    }

    fn short_upload(&self, length: u64, written: u64) -> VolliteError {
        VolliteError::Storage(format!(
            "short upload to volume {}: expected {} bytes, stream ended after {}",
            self.key, length, written
        ))
    }

    /// Stage `length` bytes beside the metadata and swap them in as the new image.
    fn replace_image(&self, stream: &mut dyn Read, length: u64, capacity: u64) -> VolliteResult<()> {
        let permissions = fs::metadata(&self.image)
            .map_err(|e| VolliteError::from_io(format!("stat {}", self.image.display()), e))?
            .permissions();
        let staging_dir = self.meta.parent().ok_or_else(|| {
            VolliteError::Internal(format!("metadata path {} has no parent", self.meta.display()))
        })?;

        let mut staged = tempfile::NamedTempFile::new_in(staging_dir).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to stage upload in {}: {}",
                staging_dir.display(),
                e
            ))
        })?;

        let written = io::copy(&mut stream.take(length), staged.as_file_mut())
            .map_err(|e| self.write_err(length, e))?;
        if written != length {
            return Err(self.short_upload(length, written));
        }
        staged.as_file_mut().flush().map_err(|e| self.write_err(length, e))?;

        if !Qcow2Helper::is_qcow2(staged.path())? {
            staged
                .as_file()
                .set_len(capacity.max(length))
                .map_err(|e| self.write_err(length, e))?;
        }
        staged
            .as_file()
            .set_permissions(permissions)
            .map_err(|e| self.write_err(length, e))?;

        staged
            .persist(&self.image)
            .map_err(|e| self.write_err(length, e.error))?;
        Ok(())
    }

    fn write_at(&self, stream: &mut dyn Read, offset: u64, length: u64) -> VolliteResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.image)
            .map_err(|e| VolliteError::from_io(format!("open {}", self.image.display()), e))?;

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| self.write_err(length, e))?;
        let written = io::copy(&mut stream.take(length), &mut file)
            .map_err(|e| self.write_err(length, e))?;
        file.flush().map_err(|e| self.write_err(length, e))?;

        if written != length {
            return Err(self.short_upload(length, written));
        }
        Ok(())
    }
}

impl VolumeHandle for DirVolume {
    fn key(&self) -> &str {
        &self.key
    }

    fn info(&self) -> VolliteResult<VolumeInfo> {
        let descriptor = self.load()?;
        Ok(VolumeInfo {
            capacity: descriptor.capacity,
            allocation: descriptor.allocation,
        })
    }

    fn descriptor(&self) -> VolliteResult<VolumeDescriptor> {
        self.load()
    }

    fn resize(&self, capacity: u64) -> VolliteResult<()> {
        let mut descriptor = self.load()?;
        if capacity < descriptor.capacity {
            return Err(VolliteError::Storage(format!(
                "cannot shrink volume '{}' from {} to {} bytes",
                descriptor.name, descriptor.capacity, capacity
            )));
        }

        if Qcow2Helper::is_qcow2(&self.image)? {
            Qcow2Helper::resize(&self.image, capacity)?;
        } else {
            RawHelper::resize(&self.image, capacity)?;
        }

        descriptor.capacity = capacity;
        descriptor.allocation = descriptor.allocation.max(capacity);
        self.store(&descriptor)?;

        tracing::info!(volume = %descriptor.name, capacity, "Resized volume");
        Ok(())
    }

    fn upload(&self, stream: &mut dyn Read, offset: u64, length: u64) -> VolliteResult<()> {
        let mut descriptor = self.load()?;
        let end = offset.checked_add(length).ok_or_else(|| {
            VolliteError::Storage(format!("upload range overflows at offset {}", offset))
        })?;
        if end > descriptor.capacity {
            return Err(VolliteError::Storage(format!(
                "upload of {} bytes at offset {} exceeds capacity {} of volume '{}'",
                length, offset, descriptor.capacity, descriptor.name
            )));
        }

        if offset == 0 {
            self.replace_image(stream, length, descriptor.capacity)?;
        } else {
            self.write_at(stream, offset, length)?;
        }

        descriptor.allocation = descriptor.allocation.max(end);
        self.store(&descriptor)?;

        tracing::debug!(volume = %descriptor.name, offset, length, "Uploaded volume content");
        Ok(())
    }

    fn delete(&self) -> VolliteResult<()> {
        fs::remove_file(&self.image)
            .map_err(|e| VolliteError::from_io(format!("delete volume {}", self.key), e))?;

        if let Err(e) = fs::remove_file(&self.meta)
            && e.kind() != io::ErrorKind::NotFound
        {
            return Err(VolliteError::Storage(format!(
                "Failed to remove metadata {}: {}",
                self.meta.display(),
                e
            )));
        }

        tracing::info!(path = %self.image.display(), "Deleted volume");
        Ok(())
    }
}
