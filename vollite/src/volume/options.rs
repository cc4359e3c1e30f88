//! Declared volume parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vollite_shared::VolumeFormat;
use vollite_shared::constants::units::MAX_CAPACITY_GIB;
use vollite_shared::errors::{VolliteError, VolliteResult};

/// Parameters a volume is declared with.
///
/// Exactly one of `capacity` and `source_image` determines the initial size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOptions {
    /// Name within the owning node.
    pub name: String,
    /// Capacity in GiB of a blank volume.
    #[serde(default)]
    pub capacity: Option<u64>,
    /// Disk image that seeds the volume's content and size.
    #[serde(default)]
    pub source_image: Option<PathBuf>,
    #[serde(default)]
    pub format: VolumeFormat,
}

impl VolumeOptions {
    pub fn builder(name: impl Into<String>) -> VolumeOptionsBuilder {
        VolumeOptionsBuilder::new(name)
    }

    /// Check the sizing rule and capacity bounds.
    pub fn validate(&self) -> VolliteResult<()> {
        if self.name.is_empty() {
            return Err(VolliteError::InvalidConfiguration(
                "volume name must not be empty".into(),
            ));
        }

        match (self.capacity, &self.source_image) {
            (Some(_), Some(image)) => Err(VolliteError::InvalidConfiguration(format!(
                "volume '{}' declares both a capacity and source image {}",
                self.name,
                image.display()
            ))),
            (None, None) => Err(VolliteError::InvalidConfiguration(format!(
                "volume '{}' declares neither a capacity nor a source image",
                self.name
            ))),
            (Some(0), None) => Err(VolliteError::InvalidConfiguration(format!(
                "volume '{}' capacity must be a positive number of GiB",
                self.name
            ))),
            (Some(gib), None) if gib > MAX_CAPACITY_GIB => {
                Err(VolliteError::InvalidConfiguration(format!(
                    "volume '{}' capacity {} GiB exceeds the maximum of {} GiB",
                    self.name, gib, MAX_CAPACITY_GIB
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Builder for [`VolumeOptions`].
#[derive(Clone, Debug)]
pub struct VolumeOptionsBuilder {
    options: VolumeOptions,
}

impl VolumeOptionsBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            options: VolumeOptions {
                name: name.into(),
                capacity: None,
                source_image: None,
                format: VolumeFormat::default(),
            },
        }
    }

    pub fn capacity(&mut self, gib: u64) -> &mut Self {
        self.options.capacity = Some(gib);
        self
    }

    pub fn source_image(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.options.source_image = Some(path.into());
        self
    }

    pub fn format(&mut self, format: VolumeFormat) -> &mut Self {
        self.options.format = format;
        self
    }

    pub fn build(&self) -> VolumeOptions {
        self.options.clone()
    }
}

/// Naming scope of the volumes belonging to one node.
///
/// Hypervisor-side names are `<environment>_<node>_<volume>`, or
/// `<environment>_<volume>` for volumes not attached to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub environment: String,
    #[serde(default)]
    pub node: Option<String>,
}

impl Namespace {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            node: None,
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn volume_name(&self, name: &str) -> String {
        match &self.node {
            Some(node) => format!("{}_{}_{}", self.environment, node, name),
            None => format!("{}_{}", self.environment, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let opts = VolumeOptions::builder("system").capacity(512).build();
        assert_eq!(opts.name, "system");
        assert_eq!(opts.capacity, Some(512));
        assert_eq!(opts.source_image, None);
        assert_eq!(opts.format, VolumeFormat::Qcow2);
        opts.validate().unwrap();

        let mut builder = VolumeOptions::builder("iso");
        builder.source_image("/tmp/admin.iso").format(VolumeFormat::Raw);
        let opts = builder.build();
        assert_eq!(opts.source_image, Some(PathBuf::from("/tmp/admin.iso")));
        assert_eq!(opts.format, VolumeFormat::Raw);
        opts.validate().unwrap();
    }

    #[test]
    fn test_validate_sizing_rule() {
        let neither = VolumeOptions::builder("vol").build();
        assert!(matches!(
            neither.validate(),
            Err(VolliteError::InvalidConfiguration(_))
        ));

        let both = VolumeOptions::builder("vol")
            .capacity(1)
            .source_image("/tmp/admin.iso")
            .build();
        assert!(matches!(
            both.validate(),
            Err(VolliteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_capacity_bounds() {
        let zero = VolumeOptions::builder("vol").capacity(0).build();
        assert!(zero.validate().is_err());

        let max = VolumeOptions::builder("vol").capacity(MAX_CAPACITY_GIB).build();
        assert!(max.validate().is_ok());

        let over = VolumeOptions::builder("vol")
            .capacity(MAX_CAPACITY_GIB + 1)
            .build();
        assert!(over.validate().is_err());

        let unnamed = VolumeOptions::builder("").capacity(1).build();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let opts: VolumeOptions =
            serde_json::from_str(r#"{"name": "system", "capacity": 10}"#).unwrap();
        assert_eq!(opts, VolumeOptions::builder("system").capacity(10).build());

        let opts: VolumeOptions = serde_json::from_str(
            r#"{"name": "iso", "source_image": "/tmp/admin.iso", "format": "raw"}"#,
        )
        .unwrap();
        assert_eq!(opts.format, VolumeFormat::Raw);
    }

    #[test]
    fn test_namespace_volume_name() {
        let ns = Namespace::new("test_env").with_node("test_node");
        assert_eq!(
            ns.volume_name("test_volume"),
            "test_env_test_node_test_volume"
        );
        assert_eq!(
            Namespace::new("test_env").volume_name("shared"),
            "test_env_shared"
        );
    }
}
