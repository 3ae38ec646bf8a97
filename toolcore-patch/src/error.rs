use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while resolving or applying a patch. `NotFound` and
/// `NotUnique` accumulate across every `replace` in one invocation and are
/// joined into a single [`PatchError::Failed`] before the call returns.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patches must be non-empty")]
    EmptyPatches,

    #[error("replace requires non-empty old text")]
    EmptyOldText,

    #[error("path must be resolved against a working directory")]
    NoWorkingDirectory,

    #[error("file '{path}' not found for replace")]
    FileNotFound { path: String },

    #[error("'{old}' is not unique in '{path}'")]
    NotUnique { path: String, old: String },

    #[error("could not locate '{old}' in '{path}' under any matching strategy")]
    NotFound { path: String, old: String },

    #[error("overlapping edits in '{path}'")]
    OverlappingEdits { path: String },

    #[error("{0}")]
    Failed(String),

    #[error("I/O error while {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Join accumulated `NotFound`/`NotUnique` errors from a single invocation
/// into one failure, per the "invocation fails atomically" rule.
pub fn join_errors(errors: Vec<PatchError>) -> PatchError {
    if errors.len() == 1 {
        return errors.into_iter().next().expect("len checked above");
    }
    let joined = errors
        .iter()
        .map(std::string::ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    PatchError::Failed(joined)
}
