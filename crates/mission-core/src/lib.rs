//! Foundational types and low-level helpers shared across mission crates.
//!
//! Provides ability/application descriptors, start requests, generational
//! ability tokens, atomic file writes, and unix-time helpers used by the
//! persistence store and the mission list manager.

pub mod ability_request;
pub mod atomic_io;
pub mod time_utils;
pub mod token;

pub use ability_request::*;
pub use atomic_io::{write_json_atomic, write_text_atomic};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
pub use token::AbilityToken;
