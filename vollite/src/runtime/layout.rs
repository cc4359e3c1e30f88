use std::path::{Path, PathBuf};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for vollite data
    pub const VOLLITE_DIR: &str = ".vollite";

    /// Subdirectory holding directory-backed pools
    pub const POOLS_DIR: &str = "pools";

    /// Subdirectory for log files
    pub const LOGS_DIR: &str = "logs";

    /// Per-pool subdirectory for volume metadata
    pub const META_DIR: &str = ".meta";
}

/// Paths derived from the vollite home directory.
#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Directory containing all directory-backed pools.
    pub fn pools_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::POOLS_DIR)
    }

    /// Default root of the directory-backed pool called `name`.
    pub fn pool_dir(&self, name: &str) -> PathBuf {
        self.pools_dir().join(name)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS_DIR)
    }
}
