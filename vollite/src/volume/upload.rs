//! Content upload with capacity grow.
//!
//! The source is opened before anything else so a missing file fails with
//! `NotFound` without touching the volume. If the image is larger than the
//! volume's current allocation the volume is grown to exactly the image
//! size, then the whole image is handed to the streaming primitive in one
//! full-length call at offset 0. The source reader is dropped on every
//! return path.

use std::io::Read;
use std::path::Path;

use vollite_shared::errors::{VolliteError, VolliteResult};

use crate::hypervisor::VolumeHandle;
use crate::units::{FileSource, file_size_bytes};

/// Push the content of `source` into the volume behind `handle`.
///
/// Returns the number of bytes declared to the streaming primitive.
///
/// # Errors
///
/// - `NotFound` if `source` cannot be opened or stat'ed
/// - `Transfer` if the resize or upload primitive fails
pub fn upload(
    handle: &dyn VolumeHandle,
    files: &dyn FileSource,
    source: &Path,
) -> VolliteResult<u64> {
    let mut stream = files.open(source)?;
    let incoming = file_size_bytes(files, source)?;
    let allocation = handle.info()?.allocation;

    if incoming > allocation {
        handle.resize(incoming).map_err(|e| {
            VolliteError::Transfer(format!(
                "resize {} from {} to {} bytes: {}",
                handle.key(),
                allocation,
                incoming,
                e
            ))
        })?;
        tracing::info!(
            key = %handle.key(),
            from = allocation,
            to = incoming,
            "Grew volume before upload"
        );
    }

    transfer(handle, &mut *stream, incoming)?;

    tracing::info!(
        key = %handle.key(),
        source = %source.display(),
        bytes = incoming,
        "Uploaded image"
    );
    Ok(incoming)
}

/// Stream `length` bytes from `stream` into the volume starting at offset 0.
pub fn transfer(handle: &dyn VolumeHandle, stream: &mut dyn Read, length: u64) -> VolliteResult<()> {
    handle.upload(stream, 0, length).map_err(|e| {
        VolliteError::Transfer(format!(
            "upload {} bytes to {}: {}",
            length,
            handle.key(),
            e
        ))
    })
}
