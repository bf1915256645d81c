//! ID generation utilities for toolhost
//!
//! Provides timestamps, session backup suffixes, and session-name validation.

use rand::Rng;

/// Marks a session directory as a backup; never part of a live session name
pub const BACKUP_MARKER: &str = ".backup.";

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a backup suffix for a session directory
///
/// Format: `backup.{timestamp_ms}.{random_hex}`
/// Example: `backup.1738300800123.a1b2c3d4`
pub fn generate_backup_suffix() -> String {
    let random: u32 = rand::rng().random();
    format!("backup.{}.{:08x}", now_ms(), random)
}

/// Whether `name` is usable as a session directory component
pub fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(BACKUP_MARKER)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
