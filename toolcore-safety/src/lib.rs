//! Static, AST-level safety screening and command extraction for shell
//! scripts about to be executed. Neither component is a security boundary:
//! the screener is a best-effort lint against common model mistakes, and
//! the extractor's output only drives advisory tool installation.

pub mod extractor;
pub mod parse;
pub mod screener;

pub use extractor::extract_candidates;
pub use parse::{CallWords, parse_calls, parse_calls_strict};
pub use screener::{PermissionDenied, reset_warnings, screen};
