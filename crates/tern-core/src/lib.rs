//! Foundational low-level utilities shared across Tern crates.
//!
//! Provides atomic file-write helpers, time utilities, and locally generated
//! identifiers used by the conversation store, the chat client, and the
//! reference emitter.

pub mod atomic_io;
pub mod ids;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use ids::{generate_local_id, to_base36};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
