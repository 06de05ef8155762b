//! Utility functions

use serde::{Deserialize, Serialize};

/// Format of release directory names; lexicographic order is chronological
pub const RELEASE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Version information for capstan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Timestamp naming a new release, in local time
pub fn release_timestamp() -> String {
    chrono::Local::now()
        .format(RELEASE_TIMESTAMP_FORMAT)
        .to_string()
}

/// Whether a release directory name is a well-formed timestamp
pub fn is_release_timestamp(name: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(name, RELEASE_TIMESTAMP_FORMAT).is_ok()
}

/// Host name of this machine, used to label local commands
pub fn local_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
