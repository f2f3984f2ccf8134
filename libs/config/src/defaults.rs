//! Default values for node settings

/// Remoting defaults
pub mod remoting {
    /// Largest accepted wire envelope, header included (bytes)
    pub const MAX_ENVELOPE_BYTES: u64 = 4 * 1024 * 1024;

    /// Deepest accepted nesting of tuples/lists/maps in a message
    pub const MAX_MESSAGE_DEPTH: usize = 64;
}

/// Logging defaults
pub mod logging {
    /// Filter used when neither the config nor `RUST_LOG` sets one
    pub const LOG_LEVEL: &str = "info";
}

/// Environment variable prefix for overrides (`REMOTING_NODE__NID=...`)
pub const ENV_PREFIX: &str = "REMOTING";
