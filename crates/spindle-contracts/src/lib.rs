//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O: serialized templates fed to the compiler, resolver
//! registries, compile reports and diagnostics.

pub const TEMPLATE_SCHEMA_VERSION: &str = "spindle.template@0.1.0";
pub const TEMPLATE_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[TEMPLATE_SCHEMA_VERSION];

pub const REGISTRY_SCHEMA_VERSION: &str = "spindle.registry@0.1.0";
pub const DIAG_SCHEMA_VERSION: &str = "spindle.diag@0.1.0";
pub const SPINDLEC_REPORT_SCHEMA_VERSION: &str = "spindlec.report@0.1.0";
pub const SPINDLEC_DISASM_SCHEMA_VERSION: &str = "spindlec.disasm@0.1.0";

/// Resource limits applied while decoding and compiling templates.
///
/// Each limit can be overridden through the environment; unparsable or zero values
/// fall back to the built-in default.
pub mod limits {
    pub const DEFAULT_MAX_TEMPLATE_BYTES: usize = 16 * 1024 * 1024;
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;

    pub const ENV_MAX_TEMPLATE_BYTES: &str = "SPINDLE_MAX_TEMPLATE_BYTES";
    pub const ENV_MAX_NESTING_DEPTH: &str = "SPINDLE_MAX_NESTING_DEPTH";
    pub const ENV_TAG_ASSERTIONS: &str = "SPINDLE_TAG_ASSERTIONS";

    pub fn max_template_bytes() -> usize {
        env_usize(ENV_MAX_TEMPLATE_BYTES).unwrap_or(DEFAULT_MAX_TEMPLATE_BYTES)
    }

    pub fn max_nesting_depth() -> usize {
        env_usize(ENV_MAX_NESTING_DEPTH).unwrap_or(DEFAULT_MAX_NESTING_DEPTH)
    }

    /// `Some(true)`/`Some(false)` when `SPINDLE_TAG_ASSERTIONS` is set to a boolean-ish value.
    pub fn tag_assertions_override() -> Option<bool> {
        let raw = std::env::var(ENV_TAG_ASSERTIONS).ok()?;
        match raw.trim() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" => Some(false),
            _ => None,
        }
    }

    fn env_usize(key: &str) -> Option<usize> {
        let raw = std::env::var(key).ok()?;
        match raw.trim().parse::<usize>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n),
        }
    }
}
