//! Volume lifecycle management.
//!
//! ## Architecture
//!
//! - `state`: lifecycle status and valid transitions
//! - `options`: declared parameters and hypervisor-side naming
//! - `context`: pool, file access and naming shared by the volumes of one node
//! - `volume_impl`: the [`Volume`] entity (define/erase/query/create_child)
//! - `upload`: content transfer with capacity grow

mod context;
mod options;
mod state;
mod upload;
mod volume_impl;

pub use context::StorageContext;
pub use options::{Namespace, VolumeOptions, VolumeOptionsBuilder};
pub use state::VolumeStatus;
pub use upload::{transfer, upload};
pub use volume_impl::{BackingStore, Volume};
