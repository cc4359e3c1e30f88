//! Disk image constants.

/// QCOW2 disk image configuration
pub mod qcow2 {
    /// QCOW2 magic ("QFI\xfb")
    pub const MAGIC: u32 = 0x514649fb;

    /// Header version written for new images
    pub const VERSION: u32 = 3;

    /// Length of the v3 header in bytes
    pub const HEADER_LENGTH: usize = 104;

    /// QCOW2 cluster size in bits (64KB = 2^16)
    pub const CLUSTER_BITS: usize = 16;

    /// QCOW2 refcount order (16-bit refcounts = 2^4)
    pub const REFCOUNT_ORDER: u8 = 4;

    /// Block size for QCOW2 formatting (512 bytes)
    pub const BLOCK_SIZE: usize = 512;

    /// Offset of the backing file name in overlays
    pub const BACKING_FILE_OFFSET: u64 = 512;

    /// Header extension type carrying the backing file format
    pub const EXT_BACKING_FORMAT: u32 = 0xE2792ACA;

    /// Largest L1 table accepted, in bytes (QEMU's QCOW_MAX_L1_SIZE)
    pub const MAX_L1_TABLE_BYTES: u64 = 32 * 1024 * 1024;

    /// Header field offsets (big-endian)
    pub mod offsets {
        pub const VERSION: usize = 4;
        pub const BACKING_FILE_OFFSET: usize = 8;
        pub const BACKING_FILE_SIZE: usize = 16;
        pub const CLUSTER_BITS: usize = 20;
        pub const SIZE: usize = 24;
        pub const L1_SIZE: usize = 36;
    }
}

/// External tooling
pub mod tools {
    /// Binary used when an image cannot be grown in place
    pub const QEMU_IMG: &str = "qemu-img";
}
