//! VolLite Shared - Types spoken on both sides of the hypervisor boundary
//!
//! This crate contains the error taxonomy, the volume descriptor model
//! and shared constants used by the volume core and by storage backends.

pub mod constants;
pub mod descriptor;
pub mod errors;

pub use descriptor::{BackingStoreTarget, Permissions, VolumeDescriptor, VolumeFormat};
pub use errors::{VolliteError, VolliteResult};
