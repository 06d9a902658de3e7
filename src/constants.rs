//! Application-wide constants
//!
//! File names, directory layout and numeric tolerances shared by the store,
//! the mode resolver and the binary.

/// On-disk layout of the configuration store
pub mod store {
    /// Directory created under the user's data dir
    pub const APP_DIR: &str = "outputd";

    /// Environment variable overriding the store directory
    pub const DIR_ENV: &str = "OUTPUTD_STORE_DIR";

    /// Operator-provided snapshot that replaces every topology snapshot on read
    pub const FIXED_CONFIG: &str = "fixed-config";

    /// Suffix appended to a topology id for the snapshot saved before a lid close
    pub const LID_OPENED_SUFFIX: &str = "_lidOpened";

    /// Subdirectory holding one global record per output hash
    pub const OUTPUTS_DIR: &str = "outputs";

    /// Subdirectory holding per-topology control files
    pub const CONTROL_DIR: &str = "control";

    /// Extension of global records and control files
    pub const JSON_EXT: &str = "json";

    /// Number of SHA-256 bytes kept for a topology id
    pub const TOPOLOGY_ID_BYTES: usize = 16;
}

/// Mode matching
pub mod mode {
    /// Relative tolerance when comparing refresh rates.
    /// Stored rates round-trip through single precision.
    pub const REFRESH_EPSILON: f64 = 1e-5;
}

/// Defaults for per-output control settings
pub mod control {
    pub const DEFAULT_AUTO_ROTATE: bool = true;
    pub const DEFAULT_AUTO_ROTATE_ONLY_IN_TABLET_MODE: bool = true;
}
