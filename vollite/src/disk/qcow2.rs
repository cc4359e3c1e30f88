//! Qcow2 disk image management.
//!
//! Creates blank qcow2 images, copy-on-write overlays that reference a
//! backing file, and grows existing images.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Command;

use qcow2_rs::meta::Qcow2Header as NativeHeader;
use vollite_shared::errors::{VolliteError, VolliteResult};

use super::VolumeFormat;
use super::constants::qcow2::{
    BACKING_FILE_OFFSET, BLOCK_SIZE, CLUSTER_BITS, EXT_BACKING_FORMAT, HEADER_LENGTH, MAGIC,
    MAX_L1_TABLE_BYTES, REFCOUNT_ORDER, VERSION, offsets,
};
use super::constants::tools::QEMU_IMG;

/// Parsed qcow2 header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qcow2Header {
    pub version: u32,
    pub cluster_bits: u32,
    /// Virtual disk size in bytes.
    pub size: u64,
    pub l1_size: u32,
    pub backing_file: Option<String>,
}

impl Qcow2Header {
    pub fn cluster_size(&self) -> u64 {
        1u64 << self.cluster_bits
    }

    /// Largest virtual size the current L1 table can address.
    pub fn l1_coverage(&self) -> u64 {
        let cluster_size = self.cluster_size();
        u64::from(self.l1_size)
            .saturating_mul(cluster_size / 8)
            .saturating_mul(cluster_size)
    }
}

/// Helper for qcow2 disk operations.
pub struct Qcow2Helper;

impl Qcow2Helper {
    /// Create a blank qcow2 image of `size_bytes` virtual size (native, via qcow2-rs).
    ///
    /// The image is sparse; only metadata clusters are written.
    pub fn create_disk(disk_path: &Path, size_bytes: u64) -> VolliteResult<()> {
        tracing::info!(
            "Creating qcow2 disk: {} ({} bytes sparse)",
            disk_path.display(),
            size_bytes
        );

        Self::l1_entries(size_bytes)?;

        // Calculate required metadata size
        let (rc_table, rc_block, _l1_table) = NativeHeader::calculate_meta_params(
            size_bytes,
            CLUSTER_BITS,
            REFCOUNT_ORDER,
            BLOCK_SIZE,
        );
        let clusters = 1 + rc_table.1 + rc_block.1;
        let buffer_size = ((clusters as usize) << CLUSTER_BITS) + BLOCK_SIZE;

        let mut header_buf = vec![0u8; buffer_size];
        NativeHeader::format_qcow2(
            &mut header_buf,
            size_bytes,
            CLUSTER_BITS,
            REFCOUNT_ORDER,
            BLOCK_SIZE,
        )
        .map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to format qcow2 header for disk {}: {}",
                disk_path.display(),
                e
            ))
        })?;

        Self::write_new_file(disk_path, &header_buf)?;

        tracing::info!("Created qcow2 disk: {}", disk_path.display());
        Ok(())
    }

    /// Create a COW child image that reads through to `base_disk`.
    ///
    /// Reads come from the base (shared), writes go to the child.
    ///
    /// # Arguments
    /// * `base_disk` - Path to the backing image (must exist)
    /// * `backing_format` - Format of the backing image
    /// * `child_path` - Path where the child image is created
    /// * `virtual_size` - Virtual size of the child in bytes
    pub fn create_cow_child_disk(
        base_disk: &Path,
        backing_format: VolumeFormat,
        child_path: &Path,
        virtual_size: u64,
    ) -> VolliteResult<()> {
        tracing::info!(
            "Creating COW child disk: {} (backing: {}, format: {})",
            child_path.display(),
            base_disk.display(),
            backing_format.as_str()
        );

        let header = Self::cow_child_header(base_disk, backing_format, virtual_size)?;
        Self::write_new_file(child_path, &header)?;

        tracing::info!("Created COW child disk: {}", child_path.display());
        Ok(())
    }

    /// Get the virtual size of a qcow2 image.
    pub fn virtual_size(path: &Path) -> VolliteResult<u64> {
        Ok(Self::read_header(path)?.size)
    }

    /// Whether `path` starts with the qcow2 magic.
    ///
    /// Files shorter than the magic are not qcow2 images.
    pub fn is_qcow2(path: &Path) -> VolliteResult<bool> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| VolliteError::from_io(format!("open {}", path.display()), e))?;

        let mut magic = [0u8; 4];
        match file.read_exact(&mut magic) {
            Ok(()) => Ok(u32::from_be_bytes(magic) == MAGIC),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(VolliteError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Read and validate the qcow2 header of `path`.
    pub fn read_header(path: &Path) -> VolliteResult<Qcow2Header> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| VolliteError::from_io(format!("open {}", path.display()), e))?;

        let mut header = [0u8; HEADER_LENGTH];
        file.read_exact(&mut header).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to read header from {}: {}",
                path.display(),
                e
            ))
        })?;

        let magic = be_u32(&header, 0);
        if magic != MAGIC {
            return Err(VolliteError::Storage(format!(
                "Invalid qcow2 magic in {}: 0x{:08x}",
                path.display(),
                magic
            )));
        }

        let backing_offset = be_u64(&header, offsets::BACKING_FILE_OFFSET);
        let backing_len = be_u32(&header, offsets::BACKING_FILE_SIZE) as usize;
        let backing_file = if backing_offset != 0 && backing_len != 0 {
            let mut name = vec![0u8; backing_len];
            file.seek(SeekFrom::Start(backing_offset))
                .and_then(|_| file.read_exact(&mut name))
                .map_err(|e| {
                    VolliteError::Storage(format!(
                        "Failed to read backing file name from {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            Some(String::from_utf8_lossy(&name).into_owned())
        } else {
            None
        };

        Ok(Qcow2Header {
            version: be_u32(&header, offsets::VERSION),
            cluster_bits: be_u32(&header, offsets::CLUSTER_BITS),
            size: be_u64(&header, offsets::SIZE),
            l1_size: be_u32(&header, offsets::L1_SIZE),
            backing_file,
        })
    }

    /// Grow a qcow2 image to `new_size` bytes.
    ///
    /// Rewrites the virtual size in place when the L1 table already covers
    /// the new size, otherwise delegates to `qemu-img resize`.
    pub fn resize(path: &Path, new_size: u64) -> VolliteResult<()> {
        let header = Self::read_header(path)?;
        if new_size < header.size {
            return Err(VolliteError::Storage(format!(
                "Refusing to shrink qcow2 disk {} from {} to {} bytes",
                path.display(),
                header.size,
                new_size
            )));
        }
        if new_size == header.size {
            return Ok(());
        }

        if new_size > header.l1_coverage() {
            return Self::resize_external(path, new_size);
        }

        let mut file = OpenOptions::new().write(true).open(path).map_err(|e| {
            VolliteError::from_io(format!("open {} for resize", path.display()), e)
        })?;
        file.seek(SeekFrom::Start(offsets::SIZE as u64))
            .and_then(|_| file.write_all(&new_size.to_be_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                VolliteError::Storage(format!(
                    "Failed to update virtual size of {}: {}",
                    path.display(),
                    e
                ))
            })?;

        tracing::debug!(
            "Resized qcow2 disk in place: {} ({} -> {} bytes)",
            path.display(),
            header.size,
            new_size
        );
        Ok(())
    }

    /// Grow a qcow2 image using external qemu-img binary.
    fn resize_external(path: &Path, new_size: u64) -> VolliteResult<()> {
        tracing::info!(
            "Resizing qcow2 disk with {}: {} to {} bytes",
            QEMU_IMG,
            path.display(),
            new_size
        );

        let output = Command::new(QEMU_IMG)
            .args(["resize", "-f", "qcow2"])
            .arg(path)
            .arg(new_size.to_string())
            .output()
            .map_err(|e| {
                VolliteError::Storage(format!("Failed to run {} (is it installed?): {}", QEMU_IMG, e))
            })?;

        if !output.status.success() {
            return Err(VolliteError::Storage(format!(
                "Failed to resize qcow2 disk {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }

    /// Build a qcow2 v3 header with backing file reference.
    ///
    /// Layout: header (cluster 0, backing name at offset 512), L1 table,
    /// refcount table, refcount block. The L1 table is empty so every
    /// read goes to the backing file.
    fn cow_child_header(
        backing_path: &Path,
        backing_format: VolumeFormat,
        virtual_size: u64,
    ) -> VolliteResult<Vec<u8>> {
        let backing_str = backing_path
            .canonicalize()
            .map_err(|e| {
                VolliteError::from_io(
                    format!("canonicalize backing path {}", backing_path.display()),
                    e,
                )
            })?
            .to_string_lossy()
            .to_string();

        let cluster_bits: u32 = CLUSTER_BITS as u32;
        let cluster_size: u64 = 1u64 << cluster_bits;

        let backing_bytes = backing_str.as_bytes();
        if backing_bytes.len() as u64 > cluster_size - BACKING_FILE_OFFSET {
            return Err(VolliteError::InvalidConfiguration(format!(
                "backing path too long for qcow2 header: {}",
                backing_str
            )));
        }
        let backing_len = backing_bytes.len() as u32;

        let format_bytes = backing_format.as_str().as_bytes();
        let format_len = format_bytes.len() as u32;

        let l1_entries = Self::l1_entries(virtual_size)?;
        let l1_size = u32::try_from(l1_entries).map_err(|_| {
            VolliteError::InvalidConfiguration(format!(
                "virtual size {} too large for qcow2 overlay",
                virtual_size
            ))
        })?;
        let l1_clusters = (l1_entries * 8).div_ceil(cluster_size);

        let l1_offset = cluster_size;
        let refcount_offset = cluster_size * (1 + l1_clusters);
        let refcount_block_offset = refcount_offset + cluster_size;
        let total_clusters = 1 + l1_clusters + 2;

        let mut header = vec![0u8; (cluster_size * total_clusters) as usize];

        header[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        header[4..8].copy_from_slice(&VERSION.to_be_bytes());
        header[8..16].copy_from_slice(&BACKING_FILE_OFFSET.to_be_bytes());
        header[16..20].copy_from_slice(&backing_len.to_be_bytes());
        header[20..24].copy_from_slice(&cluster_bits.to_be_bytes());
        header[24..32].copy_from_slice(&virtual_size.to_be_bytes());
        // 32..36 crypt method, left zero (none)
        header[36..40].copy_from_slice(&l1_size.to_be_bytes());
        header[40..48].copy_from_slice(&l1_offset.to_be_bytes());
        header[48..56].copy_from_slice(&refcount_offset.to_be_bytes());
        header[56..60].copy_from_slice(&1u32.to_be_bytes());
        // 60..96 snapshots and feature bits, left zero
        header[96..100].copy_from_slice(&(REFCOUNT_ORDER as u32).to_be_bytes());
        header[100..104].copy_from_slice(&(HEADER_LENGTH as u32).to_be_bytes());

        // Backing format extension, padded to 8 bytes, then end-of-extensions marker
        let ext = HEADER_LENGTH;
        header[ext..ext + 4].copy_from_slice(&EXT_BACKING_FORMAT.to_be_bytes());
        header[ext + 4..ext + 8].copy_from_slice(&format_len.to_be_bytes());
        header[ext + 8..ext + 8 + format_bytes.len()].copy_from_slice(format_bytes);
        let end_ext = ext + 8 + ((format_len as usize + 7) & !7);
        header[end_ext..end_ext + 8].copy_from_slice(&0u64.to_be_bytes());

        let backing_at = BACKING_FILE_OFFSET as usize;
        header[backing_at..backing_at + backing_bytes.len()].copy_from_slice(backing_bytes);

        let rt = refcount_offset as usize;
        header[rt..rt + 8].copy_from_slice(&refcount_block_offset.to_be_bytes());

        // 16-bit refcounts: every metadata cluster is in use once
        let rb = refcount_block_offset as usize;
        for i in 0..total_clusters as usize {
            header[rb + i * 2..rb + i * 2 + 2].copy_from_slice(&1u16.to_be_bytes());
        }

        Ok(header)
    }

    /// Number of L1 entries needed to address `virtual_size` bytes.
    ///
    /// Fails when the table would exceed [`MAX_L1_TABLE_BYTES`].
    fn l1_entries(virtual_size: u64) -> VolliteResult<u64> {
        let cluster_size = 1u64 << CLUSTER_BITS;
        // Each L2 table maps cluster_size / 8 clusters.
        let l2_coverage = (cluster_size / 8) * cluster_size;
        let l1_entries = virtual_size.div_ceil(l2_coverage).max(1);

        if l1_entries * 8 > MAX_L1_TABLE_BYTES {
            return Err(VolliteError::InvalidConfiguration(format!(
                "virtual size {} needs a {} byte L1 table (limit {})",
                virtual_size,
                l1_entries * 8,
                MAX_L1_TABLE_BYTES
            )));
        }
        Ok(l1_entries)
    }

    fn write_new_file(path: &Path, contents: &[u8]) -> VolliteResult<()> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                VolliteError::Storage(format!(
                    "Failed to create disk file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        file.write_all(contents).map_err(|e| {
            VolliteError::Storage(format!(
                "Failed to write qcow2 header to disk {}: {}",
                path.display(),
                e
            ))
        })
    }
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vollite_shared::constants::units::{GIB, MIB};

    #[test]
    fn test_create_disk_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.qcow2");

        Qcow2Helper::create_disk(&path, GIB).unwrap();

        let header = Qcow2Helper::read_header(&path).unwrap();
        assert_eq!(header.size, GIB);
        assert_eq!(header.cluster_bits, CLUSTER_BITS as u32);
        assert_eq!(header.backing_file, None);
        assert!(header.l1_coverage() >= GIB);
    }

    #[test]
    fn test_create_disk_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.qcow2");

        Qcow2Helper::create_disk(&path, GIB).unwrap();
        assert!(Qcow2Helper::create_disk(&path, GIB).is_err());
    }

    #[test]
    fn test_cow_child_header() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.qcow2");
        let child = dir.path().join("child.qcow2");

        Qcow2Helper::create_disk(&base, 512 * GIB).unwrap();
        Qcow2Helper::create_cow_child_disk(&base, VolumeFormat::Qcow2, &child, 512 * GIB)
            .unwrap();

        let header = Qcow2Helper::read_header(&child).unwrap();
        assert_eq!(header.version, VERSION);
        assert_eq!(header.size, 512 * GIB);
        assert_eq!(header.l1_size, 1024);
        assert_eq!(
            header.backing_file.as_deref(),
            Some(base.canonicalize().unwrap().to_str().unwrap())
        );

        let raw = std::fs::read(&child).unwrap();
        let ext = HEADER_LENGTH;
        assert_eq!(be_u32(&raw, ext), EXT_BACKING_FORMAT);
        assert_eq!(be_u32(&raw, ext + 4), 5);
        assert_eq!(&raw[ext + 8..ext + 13], b"qcow2");
    }

    #[test]
    fn test_cow_child_requires_backing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Qcow2Helper::create_cow_child_disk(
            &dir.path().join("missing.qcow2"),
            VolumeFormat::Qcow2,
            &dir.path().join("child.qcow2"),
            GIB,
        )
        .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("child.qcow2").exists());
    }

    #[test]
    fn test_resize_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.raw");
        let child = dir.path().join("child.qcow2");
        std::fs::write(&base, b"").unwrap();

        // Two L1 entries cover 1 GiB, so growing to 900 MiB stays in place
        Qcow2Helper::create_cow_child_disk(&base, VolumeFormat::Raw, &child, 600 * MIB).unwrap();
        Qcow2Helper::resize(&child, 900 * MIB).unwrap();

        let header = Qcow2Helper::read_header(&child).unwrap();
        assert_eq!(header.size, 900 * MIB);
        assert_eq!(header.l1_size, 2);
        assert_eq!(header.l1_coverage(), GIB);
    }

    #[test]
    fn test_resize_refuses_shrink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.qcow2");
        Qcow2Helper::create_disk(&path, GIB).unwrap();

        assert!(Qcow2Helper::resize(&path, GIB - 1).is_err());
        assert_eq!(Qcow2Helper::virtual_size(&path).unwrap(), GIB);
    }

    #[test]
    fn test_read_header_rejects_non_qcow2() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.img");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let err = Qcow2Helper::read_header(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid qcow2 magic"));
    }

    #[test]
    fn test_l1_table_limit() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.raw");
        let child = dir.path().join("child.qcow2");
        std::fs::write(&base, b"").unwrap();

        // 4Mi entries of 512 MiB each is the largest addressable size
        let limit = (MAX_L1_TABLE_BYTES / 8) * 512 * MIB;
        assert!(Qcow2Helper::l1_entries(limit).is_ok());

        let err = Qcow2Helper::create_cow_child_disk(&base, VolumeFormat::Raw, &child, 1u64 << 60)
            .unwrap_err();
        assert!(matches!(err, VolliteError::InvalidConfiguration(_)), "unexpected error: {}", err);
        assert!(!child.exists());

        let err = Qcow2Helper::create_disk(&dir.path().join("huge.qcow2"), limit + 1).unwrap_err();
        assert!(matches!(err, VolliteError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_is_qcow2() {
        let dir = tempfile::tempdir().unwrap();
        let qcow2 = dir.path().join("base.qcow2");
        Qcow2Helper::create_disk(&qcow2, MIB).unwrap();
        assert!(Qcow2Helper::is_qcow2(&qcow2).unwrap());

        let raw = dir.path().join("admin.iso");
        std::fs::write(&raw, b"image_data").unwrap();
        assert!(!Qcow2Helper::is_qcow2(&raw).unwrap());

        let short = dir.path().join("short.img");
        std::fs::write(&short, b"QF").unwrap();
        assert!(!Qcow2Helper::is_qcow2(&short).unwrap());

        assert!(Qcow2Helper::is_qcow2(&dir.path().join("missing")).unwrap_err().is_not_found());
    }
}
