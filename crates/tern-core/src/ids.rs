//! Locally generated opaque identifiers.
//!
//! Ids combine the wall-clock millisecond timestamp with a process-wide
//! sequence so two ids minted in the same millisecond never collide.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::time_utils::current_unix_timestamp_ms;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Renders `value` in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Returns a new id of the form `<prefix>_<millis36>_<mix36>`.
///
/// An empty prefix yields `<millis36>_<mix36>`.
pub fn generate_local_id(prefix: &str) -> String {
    let now_ms = current_unix_timestamp_ms();
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mixed = sequence
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .rotate_left(17)
        ^ u64::from(std::process::id());
    let suffix = format!(
        "{:0>4}{}",
        to_base36(mixed % 1_679_616),
        to_base36(sequence)
    );
    let prefix = prefix.trim();
    if prefix.is_empty() {
        format!("{}_{}", to_base36(now_ms), suffix)
    } else {
        format!("{prefix}_{}_{}", to_base36(now_ms), suffix)
    }
}
