//! Constants for the vollite runtime.

// Re-export shared constants from vollite-shared
pub use vollite_shared::constants::{permissions, units};

pub mod envs {
    pub const VOLLITE_HOME: &str = "VOLLITE_HOME";
}

/// Logging defaults
pub mod logging {
    /// Filter used when `RUST_LOG` is not set.
    pub const DEFAULT_FILTER: &str = "info";

    /// File name prefix of the daily-rotated log.
    pub const LOG_FILE: &str = "vollite.log";
}

/// Pool defaults
pub mod pools {
    /// Pool name used when none is configured.
    pub const DEFAULT_POOL: &str = "default-pool";
}
