//! Disk image operations.
//!
//! This module provides on-disk image handling for directory pools:
//! - `VolumeFormat` - Disk format types (Qcow2, Raw)
//! - `Qcow2Helper` - QCOW2 creation, copy-on-write overlays, header inspection and resize
//! - `RawHelper` - sparse raw image creation and resize

pub mod constants;
mod qcow2;
mod raw;

pub use qcow2::{Qcow2Header, Qcow2Helper};
pub use raw::RawHelper;
pub use vollite_shared::VolumeFormat;
