//! Structural volume descriptor.
//!
//! A [`VolumeDescriptor`] is the document a storage pool consumes to
//! materialize a volume and reports back when asked to describe one.
//! Capacity and allocation are carried verbatim in bytes; unit conversion
//! happens before a descriptor is built.
//!
//! Rendering is deterministic: identical descriptors always produce
//! byte-identical XML.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::descriptor::{BYTES_UNIT, VOLUME_TYPE};
use crate::constants::permissions::{DEFAULT_MODE, UNSET_ID};
use crate::errors::VolliteError;

/// Disk image format of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeFormat {
    /// QCOW2 (QEMU Copy-On-Write v2).
    #[default]
    Qcow2,
    /// Raw disk image.
    Raw,
}

impl VolumeFormat {
    /// Get string representation of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeFormat::Qcow2 => "qcow2",
            VolumeFormat::Raw => "raw",
        }
    }

    /// Whether volumes of this format can reference a backing store.
    pub fn supports_backing_store(&self) -> bool {
        matches!(self, VolumeFormat::Qcow2)
    }
}

impl FromStr for VolumeFormat {
    type Err = VolliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qcow2" => Ok(VolumeFormat::Qcow2),
            "raw" => Ok(VolumeFormat::Raw),
            other => Err(VolliteError::InvalidConfiguration(format!(
                "unsupported volume format '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for VolumeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk permissions of a volume image.
///
/// `None` owner/group means "no explicit ownership override" and is
/// rendered as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub mode: u32,
    #[serde(default)]
    pub owner: Option<u32>,
    #[serde(default)]
    pub group: Option<u32>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            owner: None,
            group: None,
        }
    }
}

impl Permissions {
    fn write_xml(&self, out: &mut String, indent: &str) {
        let owner = self.owner.map_or(UNSET_ID, i64::from);
        let group = self.group.map_or(UNSET_ID, i64::from);
        out.push_str(&format!("{indent}<permissions>\n"));
        out.push_str(&format!("{indent}  <mode>{:04o}</mode>\n", self.mode & 0o7777));
        out.push_str(&format!("{indent}  <owner>{}</owner>\n", owner));
        out.push_str(&format!("{indent}  <group>{}</group>\n", group));
        out.push_str(&format!("{indent}</permissions>\n"));
    }
}

/// Parent reference embedded in a copy-on-write child's descriptor.
///
/// The child inherits the parent's on-disk representation (path, format,
/// permissions) but not its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackingStoreTarget {
    pub path: PathBuf,
    pub format: VolumeFormat,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Where and how the volume image is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTarget {
    pub path: PathBuf,
    pub format: VolumeFormat,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Descriptor of a storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    pub name: String,
    pub key: String,
    /// Capacity in bytes.
    pub capacity: u64,
    /// Allocation in bytes.
    pub allocation: u64,
    pub target: VolumeTarget,
    #[serde(default)]
    pub backing_store: Option<BackingStoreTarget>,
}

impl VolumeDescriptor {
    /// Create a file volume descriptor whose key is its target path.
    ///
    /// Capacity and allocation start at zero, format at qcow2 and
    /// permissions at the defaults.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            name: name.into(),
            key: path.display().to_string(),
            capacity: 0,
            allocation: 0,
            target: VolumeTarget {
                path: path.to_path_buf(),
                format: VolumeFormat::default(),
                permissions: Permissions::default(),
            },
            backing_store: None,
        }
    }

    /// Override the lookup key (defaults to the target path).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the capacity in bytes.
    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity = bytes;
        self
    }

    /// Set the allocation in bytes.
    pub fn with_allocation(mut self, bytes: u64) -> Self {
        self.allocation = bytes;
        self
    }

    pub fn with_format(mut self, format: VolumeFormat) -> Self {
        self.target.format = format;
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.target.permissions = permissions;
        self
    }

    /// Embed a backing store block (copy-on-write parent).
    pub fn with_backing_store(mut self, backing: Option<BackingStoreTarget>) -> Self {
        self.backing_store = backing;
        self
    }

    /// Target path of the volume image.
    pub fn path(&self) -> &Path {
        &self.target.path
    }

    pub fn format(&self) -> VolumeFormat {
        self.target.format
    }

    /// Render the libvirt-style XML document for this descriptor.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("<volume type='{}'>\n", VOLUME_TYPE));
        out.push_str(&format!("  <name>{}</name>\n", escape(&self.name)));
        out.push_str(&format!("  <key>{}</key>\n", escape(&self.key)));
        out.push_str("  <source>\n  </source>\n");
        out.push_str(&format!(
            "  <capacity unit='{}'>{}</capacity>\n",
            BYTES_UNIT, self.capacity
        ));
        out.push_str(&format!(
            "  <allocation unit='{}'>{}</allocation>\n",
            BYTES_UNIT, self.allocation
        ));

        out.push_str("  <target>\n");
        write_store(
            &mut out,
            &self.target.path,
            self.target.format,
            &self.target.permissions,
        );
        out.push_str("  </target>\n");

        if let Some(backing) = &self.backing_store {
            out.push_str("  <backingStore>\n");
            write_store(&mut out, &backing.path, backing.format, &backing.permissions);
            out.push_str("  </backingStore>\n");
        }

        out.push_str("</volume>\n");
        out
    }
}

fn write_store(out: &mut String, path: &Path, format: VolumeFormat, permissions: &Permissions) {
    out.push_str(&format!("    <path>{}</path>\n", escape(&path.display().to_string())));
    out.push_str(&format!("    <format type='{}'/>\n", format.as_str()));
    permissions.write_xml(out, "    ");
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
