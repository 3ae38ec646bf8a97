//! Targeted text-patching engine for LLM-generated edits. Not a general
//! merge/diff algorithm: every patch is composed into a single edit buffer
//! over the original bytes and applied atomically, with an ordered
//! fuzzy-match fallback cascade when a `replace`'s old text has drifted
//! slightly from the file on disk.

mod diff;
mod engine;
mod error;
mod io;
mod matcher;
mod types;

pub use diff::unified_diff;
pub use engine::{PatchOutcome, apply};
pub use error::PatchError;
pub use types::{PatchInput, PatchOp};
