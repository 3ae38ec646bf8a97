//! Shared helper types reused across the tool-execution crates. Keeps path
//! normalization, secret redaction, and stable slug derivation decoupled
//! from any single crate's internals so they can be shared by the patch
//! engine and the core dispatcher alike.

pub mod paths;
pub mod sanitizer;
pub mod slug;

pub use paths::{is_safe_relative_path, normalize_path};
pub use sanitizer::redact_secrets;
pub use slug::stable_slug;
