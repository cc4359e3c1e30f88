//! Shared constants for volume sizing and descriptors.

/// Byte unit multipliers (binary prefixes).
pub mod units {
    /// Bytes in one kibibyte (2^10).
    pub const KIB: u64 = 1 << 10;

    /// Bytes in one mebibyte (2^20).
    pub const MIB: u64 = 1 << 20;

    /// Bytes in one gibibyte (2^30).
    pub const GIB: u64 = 1 << 30;

    /// Largest capacity in GiB whose byte count still fits in a u64.
    pub const MAX_CAPACITY_GIB: u64 = u64::MAX >> 30;
}

/// Default ownership and mode written into volume descriptors.
pub mod permissions {
    /// Default file mode for volume images (rw-r--r--).
    pub const DEFAULT_MODE: u32 = 0o644;

    /// Sentinel rendered for "no ownership override".
    pub const UNSET_ID: i64 = -1;
}

/// Descriptor rendering.
pub mod descriptor {
    /// Unit attribute for capacity/allocation elements.
    pub const BYTES_UNIT: &str = "bytes";

    /// `type` attribute of the root `<volume>` element; pools hold plain files.
    pub const VOLUME_TYPE: &str = "file";
}
