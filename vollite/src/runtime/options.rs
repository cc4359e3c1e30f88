//! Configuration for vollite.

use std::path::PathBuf;

use dirs::home_dir;
use serde::{Deserialize, Serialize};

use crate::runtime::constants::envs as const_envs;
use crate::runtime::constants::pools as const_pools;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::layout::dirs as const_dirs;

/// Process-wide options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolliteOptions {
    /// Root for logs and directory-backed pools.
    ///
    /// Defaults to `$VOLLITE_HOME`, falling back to `~/.vollite`.
    pub home_dir: PathBuf,
}

impl Default for VolliteOptions {
    fn default() -> Self {
        let home_dir = std::env::var(const_envs::VOLLITE_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
                path.push(const_dirs::VOLLITE_DIR);
                path
            });

        Self { home_dir }
    }
}

impl VolliteOptions {
    pub fn layout(&self) -> FilesystemLayout {
        FilesystemLayout::new(&self.home_dir)
    }
}

/// Storage backend a pool is opened with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PoolBackend {
    /// In-process pool; nothing is written to disk.
    Memory,
    /// Directory-backed pool.
    Dir {
        /// Pool root. `None` places it under `<home>/pools/<name>`.
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Default for PoolBackend {
    fn default() -> Self {
        PoolBackend::Dir { path: None }
    }
}

/// Options used when opening a storage pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default)]
    pub backend: PoolBackend,
}

fn default_pool_name() -> String {
    const_pools::DEFAULT_POOL.to_string()
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            backend: PoolBackend::default(),
        }
    }
}

impl PoolOptions {
    /// In-memory pool called `name`.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: PoolBackend::Memory,
        }
    }

    /// Directory pool called `name`, rooted at `path` when given.
    pub fn dir(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            backend: PoolBackend::Dir { path },
        }
    }
}
